//! Form submissions.

use bytes::Bytes;
use std::collections::BTreeMap;
use url::form_urlencoded;

use outbox_common::Method;
use outbox_transport::Request;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Value of a single form control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    File {
        filename: String,
        content_type: String,
        data: Bytes,
    },
}

/// A form as submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    /// Target URL (the form's action).
    pub action: String,
    pub method: Method,
    /// Whether the form opted into offline queuing.
    pub offline: bool,
    /// Controls in document order; names may repeat.
    pub fields: Vec<(String, FieldValue)>,
}

impl Form {
    /// A POST form without offline support.
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            method: Method::Post,
            offline: false,
            fields: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Opt in (or out) of offline queuing.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Add a text control.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .push((name.into(), FieldValue::Text(value.into())));
        self
    }

    /// Add a file control.
    pub fn file(
        mut self,
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.fields.push((
            name.into(),
            FieldValue::File {
                filename: filename.into(),
                content_type: content_type.into(),
                data: data.into(),
            },
        ));
        self
    }

    pub fn has_files(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, value)| matches!(value, FieldValue::File { .. }))
    }

    /// Text controls as a plain map. A repeated name keeps its last value.
    pub fn text_fields(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter_map(|(name, value)| match value {
                FieldValue::Text(text) => Some((name.clone(), text.clone())),
                FieldValue::File { .. } => None,
            })
            .collect()
    }

    /// Build the request a browser would send for this form.
    ///
    /// GET forms put the fields in the query string; others send an
    /// urlencoded body, or multipart when files are present.
    pub fn to_request(&self) -> Request {
        if !self.method.is_mutating() {
            let pairs: Vec<(&str, &str)> = self
                .fields
                .iter()
                .filter_map(|(name, value)| match value {
                    FieldValue::Text(text) => Some((name.as_str(), text.as_str())),
                    FieldValue::File { filename, .. } => Some((name.as_str(), filename.as_str())),
                })
                .collect();
            let query = encode_pairs(pairs);
            let url = if query.is_empty() {
                self.action.clone()
            } else if self.action.contains('?') {
                format!("{}&{}", self.action, query)
            } else {
                format!("{}?{}", self.action, query)
            };
            return Request::new(self.method, url);
        }

        if self.has_files() {
            let boundary = format!("----outbox-{:016x}", rand::random::<u64>());
            let body = encode_multipart(&self.fields, &boundary);
            return Request::new(self.method, self.action.clone())
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(body);
        }

        let pairs = self.fields.iter().filter_map(|(name, value)| match value {
            FieldValue::Text(text) => Some((name.as_str(), text.as_str())),
            FieldValue::File { .. } => None,
        });
        Request::new(self.method, self.action.clone())
            .header("content-type", FORM_URLENCODED)
            .body(encode_pairs(pairs))
    }
}

/// `application/x-www-form-urlencoded` serialization.
pub fn encode_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Urlencoded body for a stored field map.
pub fn encode_fields(fields: &BTreeMap<String, String>) -> String {
    encode_pairs(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

fn encode_multipart(fields: &[(String, FieldValue)], boundary: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        match value {
            FieldValue::Text(text) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(text.as_bytes());
            }
            FieldValue::File {
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_fields_last_value_wins() {
        let form = Form::new("/todos")
            .field("tag", "home")
            .field("tag", "errand")
            .field("title", "Buy milk");
        let fields = form.text_fields();
        assert_eq!(fields["tag"], "errand");
        assert_eq!(fields["title"], "Buy milk");
    }

    #[test]
    fn test_post_form_is_urlencoded() {
        let request = Form::new("/todos")
            .field("title", "Buy milk & eggs")
            .to_request();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.header_value("content-type"), Some(FORM_URLENCODED));
        assert_eq!(
            request.body.as_deref(),
            Some(b"title=Buy+milk+%26+eggs".as_slice())
        );
    }

    #[test]
    fn test_get_form_uses_query() {
        let request = Form::new("/search?page=2")
            .method(Method::Get)
            .field("q", "milk")
            .to_request();
        assert_eq!(request.url, "/search?page=2&q=milk");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_file_form_is_multipart() {
        let form = Form::new("/upload")
            .field("title", "receipt")
            .file("scan", "r.png", "image/png", vec![1u8, 2, 3]);
        assert!(form.has_files());

        let request = form.to_request();
        let content_type = request.header_value("content-type").unwrap();
        assert!(content_type.starts_with("multipart/form-data; boundary=----outbox-"));

        let body = String::from_utf8_lossy(request.body.as_deref().unwrap()).into_owned();
        assert!(body.contains("name=\"scan\"; filename=\"r.png\""));
        assert!(body.trim_end().ends_with("--"));
    }

    #[test]
    fn test_encode_fields() {
        let mut fields = BTreeMap::new();
        fields.insert("b".to_string(), "2".to_string());
        fields.insert("a".to_string(), "1 1".to_string());
        assert_eq!(encode_fields(&fields), "a=1+1&b=2");
    }
}
