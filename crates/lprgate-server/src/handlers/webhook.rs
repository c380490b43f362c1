//! Camera webhook handlers
//!
//! The camera retries on anything but its success body, so every handler
//! answers 200 with that body regardless of what happened to the event.

use axum::{Json, body::Bytes, extract::State};
use chrono::{Duration, Local, NaiveDateTime};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::captures::log_capture_failure;
use lprgate_core::{NewRecord, diagnostics::describe_error};
use lprgate_notify::entry_message;

/// Events for the same plate closer together than this are dropped
pub const DUPLICATE_WINDOW_SECS: i64 = 30;

const NOT_AVAILABLE: &str = "N/A";

fn camera_success() -> Json<Value> {
    Json(json!({"Response": {"Status": 0, "Message": "Success"}}))
}

/// A plate event extracted from a camera payload
#[derive(Debug, Clone, PartialEq)]
pub struct PlateEvent {
    pub plate: String,
    pub plate_color: String,
    pub vehicle_color: String,
    pub confidence: Option<i32>,
    /// Camera time, when it reported a parseable one
    pub camera_time: Option<NaiveDateTime>,
    /// Base64 snapshot
    pub image: Option<String>,
}

impl PlateEvent {
    /// Extract the event from a `TollgateInfo` payload
    ///
    /// # Errors
    /// A description of why the payload holds no usable plate
    pub fn from_payload(payload: &Value) -> Result<Self, String> {
        let picture = payload.get("Picture").unwrap_or(&Value::Null);
        let plate_info = picture.get("Plate").unwrap_or(&Value::Null);
        let vehicle_info = picture.get("Vehicle").unwrap_or(&Value::Null);

        let plate = match plate_info.get("PlateNumber").and_then(Value::as_str) {
            Some(raw) if raw.trim().chars().count() >= 3 => raw.trim().to_uppercase(),
            Some(raw) => return Err(format!("plate too short: {:?}", raw)),
            None => return Err("plate missing".to_string()),
        };

        let text_or_na = |value: Option<&Value>| {
            value
                .and_then(Value::as_str)
                .unwrap_or(NOT_AVAILABLE)
                .to_string()
        };

        let camera_time = picture
            .get("SnapInfo")
            .and_then(|snap| snap.get("AccurateTime"))
            .and_then(Value::as_str)
            .and_then(parse_camera_time);

        let image = ["NormalPic", "VehiclePic"]
            .iter()
            .filter_map(|key| picture.get(*key))
            .find_map(|pic| pic.get("Content").and_then(Value::as_str))
            .filter(|content| !content.is_empty())
            .map(str::to_string);

        Ok(Self {
            plate,
            plate_color: text_or_na(plate_info.get("PlateColor")),
            vehicle_color: text_or_na(vehicle_info.get("VehicleColor")),
            confidence: plate_info
                .get("Confidence")
                .and_then(Value::as_i64)
                .and_then(|c| i32::try_from(c).ok()),
            camera_time,
            image,
        })
    }
}

/// `YYYY-MM-DD HH:MM:SS[.fff]`
fn parse_camera_time(raw: &str) -> Option<NaiveDateTime> {
    let whole_seconds = raw.split('.').next().unwrap_or(raw);
    NaiveDateTime::parse_from_str(whole_seconds.trim(), "%Y-%m-%d %H:%M:%S").ok()
}

/// `POST /NotificationInfo/TollgateInfo`
pub async fn tollgate_info(State(state): State<AppState>, body: Bytes) -> Json<Value> {
    match serde_json::from_slice::<Value>(&body) {
        Ok(payload) if payload.is_object() => process_event(&state, &payload).await,
        _ => {
            warn!("TollgateInfo received without a valid JSON payload");
            state.metrics.record_event("invalid");
        }
    }
    camera_success()
}

/// `POST /NotificationInfo/KeepAlive`
pub async fn keep_alive() -> Json<Value> {
    camera_success()
}

/// `POST /NotificationInfo/DeviceInfo`
pub async fn device_info(body: Bytes) -> Json<Value> {
    let payload: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let field = |key: &str| {
        payload
            .get(key)
            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };
    info!("DeviceInfo: {} (ID: {})", field("DeviceName"), field("DeviceID"));
    Json(json!({"Result": true, "Message": "Success"}))
}

async fn process_event(state: &AppState, payload: &Value) {
    let event = match PlateEvent::from_payload(payload) {
        Ok(event) => event,
        Err(reason) => {
            warn!("Ignoring plate event: {}", reason);
            state.metrics.record_event("invalid");
            return;
        }
    };

    let session = match state.storage.session() {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to save plate event: {}", e);
            state.metrics.record_event("error");
            return;
        }
    };

    let timestamp = event
        .camera_time
        .unwrap_or_else(|| Local::now().naive_local());
    let since = timestamp - Duration::seconds(DUPLICATE_WINDOW_SECS);

    match session.find_recent(&event.plate, since).await {
        Ok(Some(existing)) => {
            debug!(
                "Duplicate plate {} within {}s of record {}",
                event.plate, DUPLICATE_WINDOW_SECS, existing.id
            );
            state.metrics.record_event("duplicate");
            return;
        }
        Ok(None) => {}
        Err(e) => {
            error!("Failed to save plate event: {}", describe_error(&e));
            state.metrics.record_event("error");
            return;
        }
    }

    let record = NewRecord::new(event.plate.clone())
        .with_plate_color(event.plate_color.clone())
        .with_vehicle_color(event.vehicle_color.clone())
        .with_confidence(event.confidence)
        .with_timestamp(timestamp);

    let saved = match session.insert(&record).await {
        Ok(saved) => saved,
        Err(e) => {
            error!("Failed to save plate event: {}", describe_error(&e));
            state.metrics.record_event("error");
            return;
        }
    };

    let mut image_file: Option<PathBuf> = None;
    if let Some(content) = event.image.as_deref() {
        match state
            .captures
            .save(saved.id, &saved.plate, timestamp, content)
            .await
        {
            Ok(stored) => match session.attach_image(saved.id, &stored.relative).await {
                Ok(()) => {
                    state.metrics.captures_stored.inc();
                    image_file = Some(stored.file);
                }
                Err(e) => error!(
                    "Failed to attach image to record {}: {}",
                    saved.id,
                    describe_error(&e)
                ),
            },
            Err(e) => log_capture_failure(&saved.plate, &e),
        }
    }

    info!(
        "Plate event stored: plate={}, color={}",
        saved.plate, event.vehicle_color
    );
    state.metrics.record_event("stored");

    if let Some(notifier) = state.notifier.clone() {
        let message = entry_message(&saved.plate, Some(&event.vehicle_color));
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&message, image_file.as_deref()).await {
                error!("Failed to send entry notification: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AllowList;
    use crate::app::{
        router,
        tests::{body_json, local_state},
    };
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::{Engine, engine::general_purpose::STANDARD};
    use lprgate_core::RecordFilter;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn payload(plate: &str, time: &str) -> Value {
        json!({
            "Picture": {
                "Plate": {"PlateNumber": plate, "PlateColor": "White", "Confidence": 91},
                "Vehicle": {"VehicleColor": "Black"},
                "SnapInfo": {"AccurateTime": time}
            }
        })
    }

    async fn post(app: axum::Router, uri: &str, body: Vec<u8>) -> axum::response::Response {
        app.oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_event_extraction() {
        let event = PlateEvent::from_payload(&payload(" abc1234 ", "2024-03-01 10:20:30.123"))
            .unwrap();
        assert_eq!(event.plate, "ABC1234");
        assert_eq!(event.plate_color, "White");
        assert_eq!(event.vehicle_color, "Black");
        assert_eq!(event.confidence, Some(91));
        assert_eq!(
            event.camera_time,
            parse_camera_time("2024-03-01 10:20:30")
        );
        assert!(event.image.is_none());
    }

    #[test]
    fn test_event_defaults() {
        let event =
            PlateEvent::from_payload(&json!({"Picture": {"Plate": {"PlateNumber": "XYZ9"}}}))
                .unwrap();
        assert_eq!(event.plate_color, "N/A");
        assert_eq!(event.vehicle_color, "N/A");
        assert_eq!(event.confidence, None);
        assert_eq!(event.camera_time, None);
    }

    #[test]
    fn test_event_rejects_short_or_missing_plates() {
        assert!(PlateEvent::from_payload(&payload(" a1 ", "")).is_err());
        assert!(PlateEvent::from_payload(&json!({"Picture": {}})).is_err());
        assert!(
            PlateEvent::from_payload(&json!({"Picture": {"Plate": {"PlateNumber": 1234}}}))
                .is_err()
        );
    }

    #[test]
    fn test_image_falls_back_to_vehicle_pic() {
        let event = PlateEvent::from_payload(&json!({
            "Picture": {
                "Plate": {"PlateNumber": "ABC1234"},
                "VehiclePic": {"Content": "aGVsbG8="}
            }
        }))
        .unwrap();
        assert_eq!(event.image.as_deref(), Some("aGVsbG8="));
    }

    #[tokio::test]
    async fn test_tollgate_stores_record_and_suppresses_duplicates() {
        let dir = TempDir::new().unwrap();
        let state = local_state(&dir).await;
        let app = router(state.clone(), Arc::new(AllowList::default()));

        let first = post(
            app.clone(),
            "/NotificationInfo/TollgateInfo",
            serde_json::to_vec(&payload("ABC1234", "2024-03-01 10:20:30")).unwrap(),
        )
        .await;
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(
            body_json(first).await,
            json!({"Response": {"Status": 0, "Message": "Success"}})
        );

        // 20 s later: duplicate; 31 s later than the first: new record
        post(
            app.clone(),
            "/NotificationInfo/TollgateInfo",
            serde_json::to_vec(&payload("ABC1234", "2024-03-01 10:20:50")).unwrap(),
        )
        .await;
        post(
            app,
            "/NotificationInfo/TollgateInfo",
            serde_json::to_vec(&payload("ABC1234", "2024-03-01 10:21:21")).unwrap(),
        )
        .await;

        let rows = state
            .storage
            .session()
            .unwrap()
            .query(&RecordFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].vehicle_color.as_deref(), Some("Black"));
        assert_eq!(rows[0].confidence, Some(91));
    }

    #[tokio::test]
    async fn test_tollgate_stores_image() {
        let dir = TempDir::new().unwrap();
        let state = local_state(&dir).await;
        let app = router(state.clone(), Arc::new(AllowList::default()));

        let mut body = payload("ABC1234", "2024-03-01 10:20:30");
        body["Picture"]["NormalPic"] = json!({
            "Content": format!("data:image/jpeg;base64,{}", STANDARD.encode(vec![7u8; 4096]))
        });
        post(
            app,
            "/NotificationInfo/TollgateInfo",
            serde_json::to_vec(&body).unwrap(),
        )
        .await;

        let rows = state
            .storage
            .session()
            .unwrap()
            .query(&RecordFilter::default())
            .await
            .unwrap();
        let image_path = rows[0].image_path.clone().unwrap();
        assert!(image_path.starts_with(&format!("captures/{}-ABC1234-20240301_102030-", rows[0].id)));

        let file_name = image_path.trim_start_matches("captures/");
        let stored = std::fs::read(dir.path().join("captures").join(file_name)).unwrap();
        assert_eq!(stored.len(), 4096);
    }

    #[tokio::test]
    async fn test_invalid_payload_still_succeeds() {
        let dir = TempDir::new().unwrap();
        let state = local_state(&dir).await;
        let app = router(state.clone(), Arc::new(AllowList::default()));

        let response = post(app, "/NotificationInfo/TollgateInfo", b"not json".to_vec()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            state.metrics.events_total.with_label_values(&["invalid"]).get(),
            1.0
        );
    }

    #[tokio::test]
    async fn test_keep_alive_and_device_info() {
        let dir = TempDir::new().unwrap();
        let app = router(local_state(&dir).await, Arc::new(AllowList::default()));

        let keep_alive = post(app.clone(), "/NotificationInfo/KeepAlive", Vec::new()).await;
        assert_eq!(
            body_json(keep_alive).await,
            json!({"Response": {"Status": 0, "Message": "Success"}})
        );

        let device = post(
            app,
            "/NotificationInfo/DeviceInfo",
            br#"{"DeviceName":"Gate 1","DeviceID":"cam-01"}"#.to_vec(),
        )
        .await;
        assert_eq!(
            body_json(device).await,
            json!({"Result": true, "Message": "Success"})
        );
    }
}
