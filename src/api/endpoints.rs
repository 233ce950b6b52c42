use std::sync::Arc;

use futures::FutureExt;
use reqwest::multipart::{Form, Part};

use crate::query::{Mutation, Query, QueryClient, QueryError};

use super::ApiClient;
use super::models::{
    Alert, ChatReply, ChatRequest, Document, DocumentStatusReport, DocumentSummary, DocumentUpload, ExitAnalysis,
    KpiSummary, MarketAnalysis, Property,
};

/// Query keys for the REIMS endpoints.
///
/// Keys embed their parameters, so `property(1)` and `property(2)` are cached
/// separately.
pub mod keys {
    pub const PROPERTIES: &str = "properties";
    pub const KPIS: &str = "kpis";
    pub const ALERTS: &str = "alerts";
    pub const DOCUMENTS: &str = "documents";

    pub fn property(id: u64) -> String {
        format!("property:{id}")
    }

    pub fn exit_strategies(property_id: u64) -> String {
        format!("exit-strategies:{property_id}")
    }

    pub fn document_status(id: u64) -> String {
        format!("document-status:{id}")
    }

    pub fn market_analysis(location: &str) -> String {
        format!("market-analysis:{location}")
    }
}

impl ApiClient {
    pub async fn properties(&self) -> Result<Vec<Property>, QueryError> {
        self.get("/api/properties", &[]).await
    }

    pub async fn property(&self, id: u64) -> Result<Property, QueryError> {
        self.get(&format!("/api/properties/{id}"), &[]).await
    }

    pub async fn kpis(&self) -> Result<KpiSummary, QueryError> {
        self.get("/api/kpis", &[]).await
    }

    pub async fn alerts(&self) -> Result<Vec<Alert>, QueryError> {
        self.get("/api/alerts", &[]).await
    }

    pub async fn acknowledge_alert(&self, id: u64) -> Result<Alert, QueryError> {
        self.post(&format!("/api/alerts/{id}/acknowledge"), &serde_json::json!({}))
            .await
    }

    pub async fn exit_strategies(&self, property_id: u64) -> Result<ExitAnalysis, QueryError> {
        self.get(&format!("/api/properties/{property_id}/exit-strategies"), &[])
            .await
    }

    pub async fn documents(&self) -> Result<Vec<Document>, QueryError> {
        self.get("/api/documents", &[]).await
    }

    /// Uploads a document as the `file` field of a multipart form.
    pub async fn upload_document(&self, upload: DocumentUpload) -> Result<Document, QueryError> {
        let part = Part::bytes(upload.content).file_name(upload.filename);
        let mut form = Form::new().part("file", part);
        if let Some(property_id) = upload.property_id {
            form = form.text("property_id", property_id.to_string());
        }
        self.post_multipart("/api/documents", form).await
    }

    pub async fn document_status(&self, id: u64) -> Result<DocumentStatusReport, QueryError> {
        self.get(&format!("/api/documents/{id}/status"), &[]).await
    }

    pub async fn market_analysis(&self, location: &str) -> Result<MarketAnalysis, QueryError> {
        self.get("/api/market-analysis", &[("location", location)]).await
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatReply, QueryError> {
        self.post("/api/ai/chat", request).await
    }

    pub async fn summarize_document(&self, id: u64) -> Result<DocumentSummary, QueryError> {
        self.post(&format!("/api/documents/{id}/summarize"), &serde_json::json!({}))
            .await
    }

    // Queries

    pub fn properties_query(&self, client: Arc<QueryClient>) -> Query<Vec<Property>> {
        let api = self.clone();
        Query::new(
            &keys::PROPERTIES,
            move || {
                let api = api.clone();
                async move { api.properties().await }.boxed()
            },
            client,
        )
    }

    pub fn property_query(&self, id: u64, client: Arc<QueryClient>) -> Query<Property> {
        let api = self.clone();
        Query::new(
            &keys::property(id),
            move || {
                let api = api.clone();
                async move { api.property(id).await }.boxed()
            },
            client,
        )
    }

    pub fn kpis_query(&self, client: Arc<QueryClient>) -> Query<KpiSummary> {
        let api = self.clone();
        Query::new(
            &keys::KPIS,
            move || {
                let api = api.clone();
                async move { api.kpis().await }.boxed()
            },
            client,
        )
    }

    pub fn alerts_query(&self, client: Arc<QueryClient>) -> Query<Vec<Alert>> {
        let api = self.clone();
        Query::new(
            &keys::ALERTS,
            move || {
                let api = api.clone();
                async move { api.alerts().await }.boxed()
            },
            client,
        )
    }

    pub fn exit_strategies_query(&self, property_id: u64, client: Arc<QueryClient>) -> Query<ExitAnalysis> {
        let api = self.clone();
        Query::new(
            &keys::exit_strategies(property_id),
            move || {
                let api = api.clone();
                async move { api.exit_strategies(property_id).await }.boxed()
            },
            client,
        )
    }

    pub fn documents_query(&self, client: Arc<QueryClient>) -> Query<Vec<Document>> {
        let api = self.clone();
        Query::new(
            &keys::DOCUMENTS,
            move || {
                let api = api.clone();
                async move { api.documents().await }.boxed()
            },
            client,
        )
    }

    pub fn document_status_query(&self, id: u64, client: Arc<QueryClient>) -> Query<DocumentStatusReport> {
        let api = self.clone();
        Query::new(
            &keys::document_status(id),
            move || {
                let api = api.clone();
                async move { api.document_status(id).await }.boxed()
            },
            client,
        )
    }

    pub fn market_analysis_query(&self, location: &str, client: Arc<QueryClient>) -> Query<MarketAnalysis> {
        let api = self.clone();
        let location = location.to_string();
        Query::new(
            &keys::market_analysis(&location),
            move || {
                let api = api.clone();
                let location = location.clone();
                async move { api.market_analysis(&location).await }.boxed()
            },
            client,
        )
    }

    // Mutations

    pub fn acknowledge_alert_mutation(&self) -> Mutation<u64, Alert> {
        let api = self.clone();
        Mutation::new(move |id: u64| {
            let api = api.clone();
            async move { api.acknowledge_alert(id).await }.boxed()
        })
    }

    pub fn upload_document_mutation(&self) -> Mutation<DocumentUpload, Document> {
        let api = self.clone();
        Mutation::new(move |upload: DocumentUpload| {
            let api = api.clone();
            async move { api.upload_document(upload).await }.boxed()
        })
    }

    pub fn chat_mutation(&self) -> Mutation<ChatRequest, ChatReply> {
        let api = self.clone();
        Mutation::new(move |request: ChatRequest| {
            let api = api.clone();
            async move { api.chat(&request).await }.boxed()
        })
    }

    pub fn summarize_document_mutation(&self) -> Mutation<u64, DocumentSummary> {
        let api = self.clone();
        Mutation::new(move |id: u64| {
            let api = api.clone();
            async move { api.summarize_document(id).await }.boxed()
        })
    }
}
