//! HTTP delivery: one POST per entry.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::{QueueEntry, QueuePayload};
use crate::error::SatchelError;
use crate::processor::ItemProcessor;

/// Per-request deadline. A hung endpoint surfaces as a transient
/// delivery failure instead of pinning a lane forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers entries by POSTing their payload as JSON to a fixed endpoint.
///
/// A non-2xx response or a transport error is a delivery failure; the
/// orchestrator decides whether to retry. The remote side must treat an
/// aborted request as a no-op; the queue cannot guarantee that on its
/// behalf.
pub struct HttpProcessor<T> {
    client: reqwest::Client,
    endpoint: reqwest::Url,

    /// Cancellation slot for the most recent `process` call. Swapped in
    /// at the start of each call; `cancel_current` fires whatever token
    /// currently occupies the slot.
    current: Mutex<CancellationToken>,

    _payload: PhantomData<fn() -> T>,
}

impl<T: QueuePayload> HttpProcessor<T> {
    pub fn new(endpoint: reqwest::Url) -> Result<Self, SatchelError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SatchelError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            current: Mutex::new(CancellationToken::new()),
            _payload: PhantomData,
        })
    }
}

#[async_trait]
impl<T: QueuePayload> ItemProcessor<T> for HttpProcessor<T> {
    async fn process(&self, entry: &QueueEntry<T>) -> Result<(), SatchelError> {
        let token = CancellationToken::new();
        *self.current.lock() = token.clone();

        let request = self
            .client
            .post(self.endpoint.clone())
            .json(entry.payload())
            .send();

        tokio::select! {
            _ = token.cancelled() => Err(SatchelError::Cancelled),
            result = request => {
                let response =
                    result.map_err(|e| SatchelError::delivery(None, e.to_string()))?;
                let status = response.status();
                if status.is_success() {
                    Ok(())
                } else {
                    Err(SatchelError::delivery(
                        Some(status.as_u16()),
                        format!("endpoint returned {status}"),
                    ))
                }
            }
        }
    }

    fn cancel_current(&self) {
        self.current.lock().cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use axum::Json;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::sync::mpsc;

    use crate::domain::{
        ActorKind, AttendanceKind, AttendanceMark, OrderNumber, RegistrationMode,
    };

    use super::*;

    fn mark(student_id: &str) -> AttendanceMark {
        AttendanceMark {
            student_id: student_id.to_string(),
            actor_kind: ActorKind::Student,
            attendance_kind: AttendanceKind::SecondaryStudent,
            registration_mode: RegistrationMode::Exit,
            offset_seconds: 45,
            education_level: "secondary".to_string(),
            grade: "2".to_string(),
            section: "C".to_string(),
        }
    }

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn endpoint(addr: SocketAddr) -> reqwest::Url {
        format!("http://{addr}/marks").parse().unwrap()
    }

    #[tokio::test]
    async fn posts_the_payload_as_camel_case_json() {
        let (tx, mut rx) = mpsc::unbounded_channel::<serde_json::Value>();
        let app = Router::new().route(
            "/marks",
            post(move |Json(body): Json<serde_json::Value>| {
                let tx = tx.clone();
                async move {
                    tx.send(body).unwrap();
                    StatusCode::OK
                }
            }),
        );
        let addr = serve(app).await;

        let processor = HttpProcessor::<AttendanceMark>::new(endpoint(addr)).unwrap();
        let entry = QueueEntry::new(OrderNumber::new(1), mark("S9"));
        processor.process(&entry).await.unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(body["studentId"], "S9");
        assert_eq!(body["registrationMode"], "exit");
        assert_eq!(body["attendanceKind"], "secondary-student");
    }

    #[tokio::test]
    async fn non_2xx_is_a_delivery_failure_with_status() {
        let app = Router::new().route(
            "/marks",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let addr = serve(app).await;

        let processor = HttpProcessor::<AttendanceMark>::new(endpoint(addr)).unwrap();
        let entry = QueueEntry::new(OrderNumber::new(1), mark("S1"));

        let err = processor.process(&entry).await.unwrap_err();
        match err {
            SatchelError::Delivery { status, .. } => assert_eq!(status, Some(500)),
            other => panic!("expected delivery failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_a_delivery_failure() {
        // Bind then drop the listener so the port is closed.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let processor = HttpProcessor::<AttendanceMark>::new(endpoint(addr)).unwrap();
        let entry = QueueEntry::new(OrderNumber::new(1), mark("S1"));

        let err = processor.process(&entry).await.unwrap_err();
        match err {
            SatchelError::Delivery { status, .. } => assert_eq!(status, None),
            other => panic!("expected delivery failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn cancel_current_aborts_the_in_flight_attempt() {
        let app = Router::new().route(
            "/marks",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                StatusCode::OK
            }),
        );
        let addr = serve(app).await;

        let processor =
            Arc::new(HttpProcessor::<AttendanceMark>::new(endpoint(addr)).unwrap());
        let entry = QueueEntry::new(OrderNumber::new(1), mark("S1"));

        let in_flight = {
            let processor = Arc::clone(&processor);
            tokio::spawn(async move { processor.process(&entry).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        processor.cancel_current();

        let result = tokio::time::timeout(Duration::from_secs(1), in_flight)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(SatchelError::Cancelled)));
    }
}
