//! Temp-mailbox HTTP backend.
//!
//! Talks to a hosted disposable inbox over its JSON API:
//!
//! - `GET  /api/mails?email=<addr>&limit=20&epin=<pin>` lists the inbox
//! - `GET  /api/mails/<id>?email=<addr>&epin=<pin>` returns one message
//! - `DELETE /api/mails/` (form: `email`, `first_id`, `epin`) removes it
//!
//! Only the newest message is inspected. Each read is followed by a short
//! pause to go easy on the remote service.

use crate::config::{RetrievalConfig, TempMailConfig};
use crate::error::{Error, Result};
use crate::matcher::{CodeMatcher, Matcher, VerificationCode};
use crate::retriever::FetchCode;
use crate::retry::{retry_with_policy, Outcome, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Identifier of a message in the temp-mailbox.
pub type MessageId = u64;

/// How many messages the list endpoint is asked for.
const LIST_LIMIT: &str = "20";

#[derive(Debug, Deserialize)]
struct MailList {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    first_id: Option<MessageId>,
}

#[derive(Debug, Deserialize)]
struct MailDetail {
    #[serde(default)]
    result: bool,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    result: bool,
}

/// Fetches verification codes from a hosted temp-mailbox.
#[derive(Debug, Clone)]
pub struct TempMailBackend {
    client: reqwest::Client,
    mailbox: TempMailConfig,
    request_pause: Duration,
    cleanup_policy: RetryPolicy,
}

impl TempMailBackend {
    /// Creates the backend from a retrieval configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if no temp-mailbox is configured or
    /// the HTTP client cannot be built.
    pub fn new(config: &RetrievalConfig) -> Result<Self> {
        let mailbox = config
            .temp_mail
            .clone()
            .ok_or_else(|| Error::InvalidConfig {
                message: "temp-mailbox backend requires temp-mail settings".into(),
            })?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.timeouts.connect)
            .timeout(config.timeouts.http)
            .build()
            .map_err(|e| Error::InvalidConfig {
                message: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            mailbox,
            request_pause: config.request_pause,
            cleanup_policy: config.cleanup_retry,
        })
    }

    /// Returns the mailbox address being watched.
    #[must_use]
    pub fn address(&self) -> String {
        self.mailbox.address()
    }

    /// Inspects the newest message in the mailbox.
    ///
    /// Returns the code together with the id of the message it came from, or
    /// `None` if the listing or the message lookup was unsuccessful, or the
    /// message carries no code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if a request fails or a response is not JSON.
    #[instrument(name = "TempMailBackend::fetch_latest", skip(self))]
    pub async fn fetch_latest(&self) -> Result<Option<(VerificationCode, MessageId)>> {
        let address = self.mailbox.address();
        let epin = self.mailbox.epin();

        let list_url = format!("{}/api/mails", self.mailbox.base_url);
        let list: MailList = self
            .get_json(
                &list_url,
                &[("email", address.as_str()), ("limit", LIST_LIMIT), ("epin", epin)],
            )
            .await?;

        if !list.result {
            debug!("Mail listing unsuccessful");
            return Ok(None);
        }
        let Some(message_id) = list.first_id.filter(|&id| id != 0) else {
            debug!("Mailbox is empty");
            return Ok(None);
        };

        let detail_url = format!("{}/api/mails/{message_id}", self.mailbox.base_url);
        let detail: MailDetail = self
            .get_json(&detail_url, &[("email", address.as_str()), ("epin", epin)])
            .await?;

        if !detail.result {
            debug!(message_id, "Mail lookup unsuccessful");
            return Ok(None);
        }

        info!(
            message_id,
            subject = detail.subject.as_deref().unwrap_or_default(),
            "Found mail"
        );

        let matcher = CodeMatcher::strict();
        debug!(message_id, matcher = matcher.description(), "Scanning mail text");

        Ok(matcher
            .find_code(detail.text.as_deref().unwrap_or_default())
            .map(|code| (code, message_id)))
    }

    /// Deletes a consumed message, retrying per the cleanup policy.
    ///
    /// Returns `true` once the service confirms the deletion and `false` if
    /// every attempt failed. Never errors.
    #[instrument(name = "TempMailBackend::delete", skip(self))]
    pub async fn delete(&self, message_id: MessageId) -> bool {
        let url = format!("{}/api/mails/", self.mailbox.base_url);
        let address = self.mailbox.address();
        let first_id = message_id.to_string();
        let form = [
            ("email", address.as_str()),
            ("first_id", first_id.as_str()),
            ("epin", self.mailbox.epin()),
        ];
        let url = url.as_str();
        let form = &form;

        let result = retry_with_policy(&self.cleanup_policy, move |attempt| async move {
            let response = match self.client.delete(url).form(form).send().await {
                Ok(response) => response,
                Err(e) => return Outcome::Failed(e),
            };

            match response.json::<DeleteResponse>().await {
                Ok(body) if body.result => Outcome::Ready(()),
                Ok(_) => {
                    debug!(attempt, "Delete not confirmed");
                    Outcome::NotReady
                }
                Err(e) => Outcome::Failed(e),
            }
        })
        .await;

        match result {
            Ok(()) => {
                debug!("Consumed mail deleted");
                true
            }
            Err(e) => {
                warn!(error = ?e, "Failed to delete consumed mail");
                false
            }
        }
    }

    /// Sends a GET, pauses, then decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = async {
            self.client
                .get(url)
                .query(query)
                .send()
                .await?
                .json::<T>()
                .await
        }
        .await;

        tokio::time::sleep(self.request_pause).await;

        response.map_err(|source| Error::Http {
            url: url.to_string(),
            source,
        })
    }
}

impl FetchCode for TempMailBackend {
    fn fetch_code(&self) -> impl Future<Output = Result<Option<VerificationCode>>> + Send {
        async move {
            match self.fetch_latest().await? {
                Some((code, message_id)) => {
                    self.delete(message_id).await;
                    Ok(Some(code))
                }
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers each incoming request with the next canned JSON body,
    /// recording the request lines it saw.
    async fn canned_server(bodies: Vec<&'static str>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            for body in bodies {
                let (mut socket, _) = listener.accept().await.unwrap();
                let request = read_request(&mut socket).await;
                log.lock().unwrap().push(request);

                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
        });

        (base_url, seen)
    }

    /// Reads one request (head plus body) and returns "METHOD target [body]".
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let content_length = text[..head_end]
                    .lines()
                    .find_map(|l| {
                        l.to_ascii_lowercase()
                            .strip_prefix("content-length:")
                            .map(|v| v.trim().parse::<usize>().unwrap())
                    })
                    .unwrap_or(0);
                if buf.len() >= head_end + 4 + content_length || n == 0 {
                    let request_line = text.lines().next().unwrap_or_default();
                    let body = &text[head_end + 4..];
                    return format!("{request_line} {body}").trim_end().to_string();
                }
            }
            if n == 0 {
                return text;
            }
        }
    }

    fn backend(base_url: &str) -> TempMailBackend {
        paced_backend(base_url, Duration::ZERO)
    }

    fn paced_backend(base_url: &str, pause: Duration) -> TempMailBackend {
        let config = RetrievalConfig::builder()
            .account("box@mailto.plus")
            .temp_mail(TempMailConfig::new("box", "@mailto.plus", "4321").with_base_url(base_url))
            .request_pause(pause)
            .cleanup_retry(RetryPolicy::new(5, Duration::ZERO))
            .build()
            .unwrap();
        TempMailBackend::new(&config).unwrap()
    }

    #[test]
    fn test_response_parsing_tolerates_missing_fields() {
        let list: MailList = serde_json::from_str(r#"{"result": true, "count": 0}"#).unwrap();
        assert!(list.result);
        assert_eq!(list.first_id, None);

        let list: MailList = serde_json::from_str(r#"{"first_id": 12, "mail_list": []}"#).unwrap();
        assert!(!list.result);
        assert_eq!(list.first_id, Some(12));

        let detail: MailDetail = serde_json::from_str(r#"{"result": true, "text": null}"#).unwrap();
        assert!(detail.result);
        assert_eq!(detail.text, None);
        assert_eq!(detail.subject, None);

        let deleted: DeleteResponse = serde_json::from_str("{}").unwrap();
        assert!(!deleted.result);
    }

    #[tokio::test]
    async fn test_unsuccessful_listing_skips_detail() {
        let (base_url, seen) = canned_server(vec![r#"{"result": false}"#]).await;

        let result = backend(&base_url).fetch_latest().await.unwrap();

        assert_eq!(result, None);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("GET /api/mails?email=box%40mailto.plus&limit=20&epin=4321"));
    }

    #[tokio::test]
    async fn test_empty_mailbox() {
        let (base_url, seen) = canned_server(vec![r#"{"result": true, "first_id": 0}"#]).await;

        assert_eq!(backend(&base_url).fetch_latest().await.unwrap(), None);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_code_found_and_message_deleted() {
        let (base_url, seen) = canned_server(vec![
            r#"{"result": true, "first_id": 8812, "count": 1}"#,
            r#"{"result": true, "subject": "Sign in", "text": "Sent to box@mailto.plus\nYour code is 493027"}"#,
            r#"{"result": false}"#,
            r#"{"result": true}"#,
        ])
        .await;

        let code = backend(&base_url).fetch_code().await.unwrap();

        assert_eq!(code.map(VerificationCode::into_string), Some("493027".into()));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!(seen[1].starts_with("GET /api/mails/8812?email=box%40mailto.plus&epin=4321"));
        assert!(seen[2].starts_with("DELETE /api/mails/ "));
        assert!(seen[2].ends_with("email=box%40mailto.plus&first_id=8812&epin=4321"));
    }

    #[tokio::test]
    async fn test_detail_without_code() {
        let (base_url, seen) = canned_server(vec![
            r#"{"result": true, "first_id": 5}"#,
            r#"{"result": true, "subject": "Hi", "text": "Reach us at help@123456.io"}"#,
        ])
        .await;

        assert_eq!(backend(&base_url).fetch_code().await.unwrap(), None);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unsuccessful_detail() {
        let (base_url, _) = canned_server(vec![
            r#"{"result": true, "first_id": 5}"#,
            r#"{"result": false}"#,
        ])
        .await;

        assert_eq!(backend(&base_url).fetch_latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_json_is_retryable_http_error() {
        let (base_url, _) = canned_server(vec!["<html>busy</html>"]).await;

        let err = backend(&base_url).fetch_latest().await.unwrap_err();
        assert!(matches!(err, Error::Http { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_delete_gives_up_after_five_attempts() {
        let (base_url, seen) = canned_server(vec![r#"{"result": false}"#; 5]).await;

        assert!(!backend(&base_url).delete(17).await);
        assert_eq!(seen.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_delete_retries_malformed_response() {
        let (base_url, seen) = canned_server(vec!["not json", r#"{"result": true}"#]).await;

        assert!(backend(&base_url).delete(17).await);
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    const PAUSE: Duration = Duration::from_millis(300);

    #[tokio::test]
    async fn test_pause_after_unsuccessful_listing() {
        let (base_url, _) = canned_server(vec![r#"{"result": false}"#]).await;
        let backend = paced_backend(&base_url, PAUSE);

        let started = Instant::now();
        assert_eq!(backend.fetch_latest().await.unwrap(), None);
        let elapsed = started.elapsed();

        assert!(elapsed >= PAUSE, "elapsed {elapsed:?}");
        assert!(elapsed < PAUSE * 2, "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_pause_after_each_lookup_request() {
        let (base_url, seen) = canned_server(vec![
            r#"{"result": true, "first_id": 5}"#,
            r#"{"result": true, "subject": "Hi", "text": "Your code is 204816"}"#,
        ])
        .await;
        let backend = paced_backend(&base_url, PAUSE);

        let started = Instant::now();
        let found = backend.fetch_latest().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(found.map(|(code, id)| (code.into_string(), id)), Some(("204816".into(), 5)));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(elapsed >= PAUSE * 2, "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_pause_even_when_listing_is_not_json() {
        let (base_url, _) = canned_server(vec!["<html>busy</html>"]).await;
        let backend = paced_backend(&base_url, PAUSE);

        let started = Instant::now();
        let err = backend.fetch_latest().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::Http { .. }));
        assert!(elapsed >= PAUSE, "elapsed {elapsed:?}");
        assert!(elapsed < PAUSE * 2, "elapsed {elapsed:?}");
    }
}
