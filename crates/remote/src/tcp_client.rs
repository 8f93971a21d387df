//! A minimal, explicitly-labeled TCP reference transport: `TcpRemoteStore`
//! dials a peer speaking the [`crate::protocol`] framing, and [`serve`] runs
//! that framing on top of any `Store` implementation. Neither claims to be
//! the real remote vector database's wire protocol (spec §1).

use crate::protocol::{Frame, Request, Response};
use async_trait::async_trait;
use contextd_core::filter::FilterMap;
use contextd_core::{ContextdError, Document, IsolationMode, Result, SearchResult, Store};
use contextd_core::tenant::OpContext;
use contextd_sync::RemoteSync;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

fn io_to_contextd(err: std::io::Error) -> ContextdError {
    ContextdError::Transient(format!("remote transport error: {err}"))
}

/// A `Store` that dials `addr` fresh for every call and speaks the
/// length-prefixed [`Request`]/[`Response`] protocol.
///
/// One connection per call keeps the reference client simple; production
/// use would pool connections, which is explicitly out of scope here.
pub struct TcpRemoteStore {
    addr: SocketAddr,
    default_collection: String,
    isolation_mode: Mutex<IsolationMode>,
}

impl TcpRemoteStore {
    /// Construct a client that will dial `addr` on every call.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            default_collection: "default".to_string(),
            isolation_mode: Mutex::new(IsolationMode::default()),
        }
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let mut stream = TcpStream::connect(self.addr).await.map_err(io_to_contextd)?;
        Frame::write(&mut stream, &request).await.map_err(io_to_contextd)?;
        Frame::read(&mut stream).await.map_err(io_to_contextd)
    }

    fn expect_ack(response: Response) -> Result<()> {
        match response {
            Response::Ack => Ok(()),
            Response::Error(e) => Err(ContextdError::Permanent(e)),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: Response) -> ContextdError {
    ContextdError::Permanent(format!("unexpected response shape: {response:?}"))
}

#[async_trait]
impl RemoteSync for TcpRemoteStore {
    async fn upsert_documents(&self, docs: Vec<Document>) -> Result<Vec<String>> {
        let response = self
            .call(Request::Upsert {
                collection: self.default_collection.clone(),
                docs,
            })
            .await?;
        match response {
            Response::Ids(ids) => Ok(ids),
            Response::Error(e) => Err(ContextdError::Permanent(e)),
            other => Err(unexpected(other)),
        }
    }

    async fn delete_documents(&self, ids: Vec<String>) -> Result<()> {
        let response = self
            .call(Request::Delete {
                collection: self.default_collection.clone(),
                ids,
            })
            .await?;
        Self::expect_ack(response)
    }
}

#[async_trait]
impl Store for TcpRemoteStore {
    async fn add_documents(&self, ctx: &OpContext, docs: Vec<Document>) -> Result<Vec<String>> {
        let mode = *self.isolation_mode.lock();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;
        let docs = mode.inject_metadata(docs, tenant)?;
        RemoteSync::upsert_documents(self, docs).await
    }

    async fn search(&self, ctx: &OpContext, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.search_with_filters(ctx, query, k, FilterMap::new()).await
    }

    async fn search_with_filters(
        &self,
        ctx: &OpContext,
        query: &str,
        k: usize,
        filters: FilterMap,
    ) -> Result<Vec<SearchResult>> {
        let mode = *self.isolation_mode.lock();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;
        let _ = mode.inject_filter(filters, tenant)?;
        let response = self
            .call(Request::Search {
                collection: self.default_collection.clone(),
                query: query.to_string(),
                k,
            })
            .await?;
        match response {
            Response::Results(results) => Ok(results),
            Response::Error(e) => Err(ContextdError::Permanent(e)),
            other => Err(unexpected(other)),
        }
    }

    async fn search_in_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let mode = *self.isolation_mode.lock();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;
        let response = self
            .call(Request::Search {
                collection: collection.to_string(),
                query: query.to_string(),
                k,
            })
            .await?;
        match response {
            Response::Results(results) => Ok(results),
            Response::Error(e) => Err(ContextdError::Permanent(e)),
            other => Err(unexpected(other)),
        }
    }

    async fn exact_search(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search_in_collection(ctx, collection, query, k).await
    }

    async fn delete_documents(&self, _ctx: &OpContext, ids: Vec<String>) -> Result<()> {
        RemoteSync::delete_documents(self, ids).await
    }

    async fn delete_documents_from_collection(
        &self,
        _ctx: &OpContext,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<()> {
        let response = self
            .call(Request::Delete {
                collection: collection.to_string(),
                ids,
            })
            .await?;
        Self::expect_ack(response)
    }

    async fn create_collection(
        &self,
        _ctx: &OpContext,
        name: &str,
        vector_size: usize,
    ) -> Result<()> {
        let response = self
            .call(Request::CreateCollection {
                name: name.to_string(),
                vector_size,
            })
            .await?;
        Self::expect_ack(response)
    }

    async fn delete_collection(&self, _ctx: &OpContext, name: &str) -> Result<()> {
        let response = self.call(Request::DeleteCollection { name: name.to_string() }).await?;
        Self::expect_ack(response)
    }

    async fn collection_exists(&self, _ctx: &OpContext, name: &str) -> Result<bool> {
        let response = self.call(Request::CollectionExists { name: name.to_string() }).await?;
        match response {
            Response::Exists(b) => Ok(b),
            Response::Error(e) => Err(ContextdError::Permanent(e)),
            other => Err(unexpected(other)),
        }
    }

    async fn list_collections(&self, _ctx: &OpContext) -> Result<Vec<String>> {
        let response = self.call(Request::ListCollections).await?;
        match response {
            Response::Names(names) => Ok(names),
            Response::Error(e) => Err(ContextdError::Permanent(e)),
            other => Err(unexpected(other)),
        }
    }

    async fn get_collection_info(
        &self,
        _ctx: &OpContext,
        name: &str,
    ) -> Result<contextd_core::CollectionInfo> {
        let response = self.call(Request::GetCollectionInfo { name: name.to_string() }).await?;
        match response {
            Response::Info(info) => Ok(info),
            Response::Error(e) => Err(ContextdError::Permanent(e)),
            other => Err(unexpected(other)),
        }
    }

    fn set_isolation_mode(&self, mode: IsolationMode) {
        *self.isolation_mode.lock() = mode;
    }

    fn isolation_mode(&self) -> IsolationMode {
        *self.isolation_mode.lock()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Run the reference server loop: accept connections on `listener` and
/// dispatch each framed request to `backend`, forever (or until the
/// listener errors).
///
/// The backend sees requests with an empty `OpContext` — any tenant
/// isolation has already been applied by the caller (the Fallback Store)
/// before the request reached the wire.
pub async fn serve(listener: TcpListener, backend: Arc<dyn Store>) -> std::io::Result<()> {
    loop {
        let (stream, _) = listener.accept().await?;
        let backend = Arc::clone(&backend);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, backend).await {
                tracing::warn!(error = %err, "reference server connection ended with error");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, backend: Arc<dyn Store>) -> std::io::Result<()> {
    let ctx = OpContext::empty();
    loop {
        let request: Request = match Frame::read(&mut stream).await {
            Ok(r) => r,
            Err(_) => return Ok(()), // peer closed the connection
        };
        let response = dispatch(&ctx, &*backend, request).await;
        Frame::write(&mut stream, &response).await?;
    }
}

async fn dispatch(ctx: &OpContext, backend: &dyn Store, request: Request) -> Response {
    let result = match request {
        Request::Upsert { collection, mut docs } => {
            for doc in docs.iter_mut() {
                doc.collection = Some(collection.clone());
            }
            backend.add_documents(ctx, docs).await.map(Response::Ids)
        }
        Request::Delete { collection, ids } => backend
            .delete_documents_from_collection(ctx, &collection, ids)
            .await
            .map(|_| Response::Ack),
        Request::Search { collection, query, k } => backend
            .search_in_collection(ctx, &collection, &query, k)
            .await
            .map(Response::Results),
        Request::CreateCollection { name, vector_size } => backend
            .create_collection(ctx, &name, vector_size)
            .await
            .map(|_| Response::Ack),
        Request::DeleteCollection { name } => {
            backend.delete_collection(ctx, &name).await.map(|_| Response::Ack)
        }
        Request::CollectionExists { name } => {
            backend.collection_exists(ctx, &name).await.map(Response::Exists)
        }
        Request::ListCollections => backend.list_collections(ctx).await.map(Response::Names),
        Request::GetCollectionInfo { name } => {
            backend.get_collection_info(ctx, &name).await.map(Response::Info)
        }
    };
    result.unwrap_or_else(|e| Response::Error(e.to_string()))
}
