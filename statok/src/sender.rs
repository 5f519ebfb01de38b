//! Stage 3: frame delivery with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use crate::frame::BYTES_POOL;
use crate::http::{HttpError, HttpTransport};

/// Consumes frames from the send queue until it closes.
///
/// Every frame is delivered with [`deliver`] and recycled afterwards,
/// whether delivery succeeded or not.
pub(crate) async fn send_loop(
    mut send_rx: mpsc::Receiver<Vec<u8>>,
    transport: Arc<dyn HttpTransport>,
    url: String,
    api_key: String,
    attempts: usize,
    retry_interval: Duration,
) {
    while let Some(mut frame) = send_rx.recv().await {
        if let Err(error) = deliver(&*transport, &url, &api_key, &frame, attempts, retry_interval).await
        {
            debug!(%error, bytes = frame.len(), "dropping frame after failed delivery");
        }

        frame.clear();
        BYTES_POOL.put(frame);
    }
}

/// Attempts to deliver one frame, waiting `retry_interval` between
/// attempts. Success is an HTTP 200 response; anything else counts as a
/// failed attempt. Returns the last error once `attempts` are exhausted.
async fn deliver(
    transport: &dyn HttpTransport,
    url: &str,
    api_key: &str,
    frame: &[u8],
    attempts: usize,
    retry_interval: Duration,
) -> Result<(), HttpError> {
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match transport.post(url, api_key, frame).await {
            Ok(200) => return Ok(()),
            Ok(status) => HttpError::Status(status),
            Err(error) => error,
        };

        if attempt >= attempts {
            return Err(error);
        }

        debug!(attempt, %error, "frame delivery failed, retrying");
        tokio::time::sleep(retry_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use crate::http::TransportFuture;

    use super::*;

    #[derive(Default)]
    struct MockTransport {
        requests: Mutex<Vec<(String, String, Vec<u8>)>>,
        responses: Mutex<VecDeque<Result<u16, HttpError>>>,
    }

    impl MockTransport {
        fn respond_with(responses: impl IntoIterator<Item = Result<u16, HttpError>>) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl HttpTransport for MockTransport {
        fn post<'a>(
            &'a self,
            url: &'a str,
            api_key: &'a str,
            body: &'a [u8],
        ) -> TransportFuture<'a> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_owned(), api_key.to_owned(), body.to_vec()));

            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(200));

            Box::pin(async move { response })
        }
    }

    const RETRY: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_delivers_on_first_attempt() {
        let transport = MockTransport::respond_with([Ok(200)]);

        deliver(&transport, "https://x/api/i2", "1_s", b"frame", 3, RETRY)
            .await
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, "https://x/api/i2");
        assert_eq!(requests[0].1, "1_s");
        assert_eq!(requests[0].2, b"frame");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let transport = MockTransport::respond_with([Ok(500), Ok(503), Ok(200)]);

        deliver(&transport, "https://x/api/i2", "1_s", b"frame", 3, RETRY)
            .await
            .unwrap();

        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempts_exhausted() {
        let transport = MockTransport::respond_with([Ok(500), Ok(500), Ok(500), Ok(500)]);

        let error = deliver(&transport, "https://x/api/i2", "1_s", b"frame", 3, RETRY)
            .await
            .unwrap_err();

        assert!(matches!(error, HttpError::Status(500)));
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_loop_recycles_and_continues() {
        let transport = Arc::new(MockTransport::respond_with([Ok(500), Ok(500), Ok(500), Ok(200)]));
        let (send_tx, send_rx) = mpsc::channel(4);

        let worker = tokio::spawn(send_loop(
            send_rx,
            Arc::clone(&transport) as Arc<dyn HttpTransport>,
            "https://x/api/i2".to_owned(),
            "1_s".to_owned(),
            3,
            RETRY,
        ));

        // First frame exhausts its attempts, second succeeds immediately.
        send_tx.send(b"first".to_vec()).await.unwrap();
        send_tx.send(b"second".to_vec()).await.unwrap();
        drop(send_tx);
        worker.await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[3].2, b"second");
    }
}
