//! Rebuilding requests from queued items.

use outbox_queue::{Payload, QueueItem};
use outbox_transport::Request;

use crate::form::{encode_fields, FORM_URLENCODED};

/// The request to send when replaying `item`.
///
/// Form submissions are re-encoded as urlencoded bodies; raw requests go out
/// with their original headers and body.
pub fn replay_request(item: &QueueItem) -> Request {
    let request = Request::new(item.method, item.url.clone());
    match &item.payload {
        Payload::FormSubmission { fields } => request
            .header("content-type", FORM_URLENCODED)
            .body(encode_fields(fields)),
        Payload::RawRequest { headers, body } => {
            let mut request = Request {
                headers: headers.clone(),
                ..request
            };
            if let Some(body) = body {
                request = request.body(body.clone());
            }
            request
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use outbox_common::{ItemId, Method};
    use std::collections::BTreeMap;

    #[test]
    fn test_form_item_replays_as_urlencoded() {
        let item = QueueItem::new(
            ItemId::new(1),
            Method::Post,
            "https://app.test/todos",
            Payload::form([("title", "Buy milk")]),
            Utc::now(),
        )
        .unwrap();

        let request = replay_request(&item);
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.url, "https://app.test/todos");
        assert_eq!(request.header_value("content-type"), Some(FORM_URLENCODED));
        assert_eq!(request.body.as_deref(), Some(b"title=Buy+milk".as_slice()));
    }

    #[test]
    fn test_raw_item_replays_verbatim() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("x-request-id".to_string(), "abc".to_string());
        let item = QueueItem::new(
            ItemId::new(2),
            Method::Put,
            "https://app.test/todos/4",
            Payload::raw(headers.clone(), Some(b"{\"done\":true}".to_vec())),
            Utc::now(),
        )
        .unwrap();

        let request = replay_request(&item);
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.headers, headers);
        assert_eq!(request.body.as_deref(), Some(b"{\"done\":true}".as_slice()));
    }
}
