//! Records API
//!
//! `GET /api/records?placa|plate=&data_inicio|start_date=&data_fim|end_date=`

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::app::AppState;
use lprgate_core::{Record, RecordFilter, Result, diagnostics::describe_error};

/// Query parameters; Portuguese names take precedence
#[derive(Debug, Default, Deserialize)]
pub struct RecordsQuery {
    pub placa: Option<String>,
    pub plate: Option<String>,
    pub data_inicio: Option<String>,
    pub start_date: Option<String>,
    pub data_fim: Option<String>,
    pub end_date: Option<String>,
}

impl RecordsQuery {
    pub fn filter(&self) -> RecordFilter {
        fn pick<'a>(first: &'a Option<String>, second: &'a Option<String>) -> Option<&'a str> {
            first
                .as_deref()
                .filter(|v| !v.is_empty())
                .or(second.as_deref())
        }

        RecordFilter::from_query(
            pick(&self.placa, &self.plate),
            pick(&self.data_inicio, &self.start_date),
            pick(&self.data_fim, &self.end_date),
        )
    }
}

/// Record as returned to the frontend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordView {
    pub id: i64,
    pub placa: String,
    pub cor_placa: Option<String>,
    pub cor_veiculo: Option<String>,
    pub confianca: Option<i32>,
    pub imagem_url: Option<String>,
    pub timestamp: NaiveDateTime,
}

impl From<Record> for RecordView {
    fn from(record: Record) -> Self {
        Self {
            id: record.id,
            placa: record.plate,
            cor_placa: record.plate_color,
            cor_veiculo: record.vehicle_color,
            confianca: record.confidence,
            imagem_url: record.image_path.map(|path| format!("/static/{}", path)),
            timestamp: record.timestamp,
        }
    }
}

pub async fn list_records(
    State(state): State<AppState>,
    Query(query): Query<RecordsQuery>,
) -> Response {
    match fetch(&state, &query.filter()).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => {
            let message = describe_error(&e);
            error!("Failed to list records: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"erro": "Erro ao buscar registros", "mensagem": message})),
            )
                .into_response()
        }
    }
}

async fn fetch(state: &AppState, filter: &RecordFilter) -> Result<Vec<RecordView>> {
    let session = state.storage.session()?;
    let records = session.query(filter).await?;
    Ok(records.into_iter().map(RecordView::from).collect())
}
