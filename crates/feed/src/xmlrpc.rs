//! Changelog over the index's XML-RPC endpoint.
//!
//! Only two methods are used: `changelog_last_serial()` and
//! `changelog_since_serial(serial)`. The latter answers with rows of
//! `[name, version, timestamp, action, serial]`, capped server-side (50,000
//! rows on PyPI).
//!
//! Responses are small, regular documents, so they are read with the same
//! lenient tree parser used for the simple index rather than a dedicated XML
//! stack. The parser lowercases element names and treats `<param>` as a void
//! element, neither of which matters for locating `<value>` trees.

use crate::changelog::ChangelogFeed;
use crate::consts;
use crate::error::{ErrorKind, Result};
use crate::event::{Page, RawChange, Serial};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use scraper::{ElementRef, Html};
use tracing::instrument;

/// A decoded XML-RPC value.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Value {
    Int(i64),
    Bool(bool),
    Double(f64),
    Str(String),
    Nil,
    Array(Vec<Value>),
    Struct(Vec<(String, Value)>),
}
impl Value {
    fn decode(element: ElementRef<'_>) -> Result<Self> {
        let Some(typed) = child_elements(element).next() else {
            // A bare `<value>text</value>` is a string.
            return Ok(Self::Str(element.text().collect()));
        };
        let text = || typed.text().collect::<String>();
        let value = match typed.value().name() {
            "int" | "i4" | "i8" => Self::Int(parse_number(&text())?),
            "boolean" => Self::Bool(text().trim() == "1"),
            "double" => Self::Double(text().trim().parse::<f64>().or_raise(|| decode_error("bad double"))?),
            "string" => Self::Str(text()),
            "nil" => Self::Nil,
            "array" => {
                let data = child_elements(typed).find(|e| e.value().name() == "data");
                let items = data.into_iter().flat_map(child_elements).filter(|e| e.value().name() == "value");
                Self::Array(items.map(Self::decode).collect::<Result<_>>()?)
            },
            "struct" => {
                let mut members = Vec::new();
                for member in child_elements(typed).filter(|e| e.value().name() == "member") {
                    let name = child_elements(member)
                        .find(|e| e.value().name() == "name")
                        .map(|e| e.text().collect::<String>())
                        .ok_or_raise(|| decode_error("struct member without name"))?;
                    let value = child_elements(member)
                        .find(|e| e.value().name() == "value")
                        .ok_or_raise(|| decode_error("struct member without value"))?;
                    members.push((name, Self::decode(value)?));
                }
                Self::Struct(members)
            },
            other => exn::bail!(decode_error(&format!("unsupported value type <{other}>"))),
        };
        Ok(value)
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    fn into_string(self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Self::Struct(members) => members.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

fn child_elements(element: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    element.children().filter_map(ElementRef::wrap)
}

fn parse_number(text: &str) -> Result<i64> {
    text.trim().parse::<i64>().or_raise(|| decode_error(&format!("bad integer {text:?}")))
}

fn decode_error(reason: &str) -> ErrorKind {
    ErrorKind::Decode(reason.to_string())
}

/// Build a `methodCall` document with integer parameters.
pub(crate) fn method_call(method: &str, params: &[i64]) -> String {
    let params: String =
        params.iter().map(|p| format!("<param><value><int>{p}</int></value></param>")).collect();
    format!(
        "<?xml version=\"1.0\"?><methodCall><methodName>{method}</methodName><params>{params}</params></methodCall>"
    )
}

/// Decode a `methodResponse` document into its single return value,
/// surfacing faults as [`ErrorKind::Fault`].
pub(crate) fn method_response(body: &str) -> Result<Value> {
    let document = Html::parse_document(body);
    if let Some(fault) = document.select(&consts::FAULT_SELECTOR).next() {
        let value = fault.select(&consts::VALUE_SELECTOR).next().ok_or_raise(|| decode_error("empty fault"))?;
        let value = Value::decode(value)?;
        let code = value.member("faultCode").and_then(Value::as_int).unwrap_or_default();
        let message = match value.member("faultString") {
            Some(Value::Str(s)) => s.clone(),
            _ => String::new(),
        };
        exn::bail!(ErrorKind::Fault { code, message });
    }
    // Document order puts the return value's own `<value>` first.
    let value = document.select(&consts::VALUE_SELECTOR).next().ok_or_raise(|| decode_error("no return value"))?;
    Value::decode(value)
}

/// Interpret a `changelog_since_serial` row.
pub(crate) fn raw_change(row: Value) -> Result<RawChange> {
    let Value::Array(fields) = row else {
        exn::bail!(decode_error("changelog row is not an array"));
    };
    let fields: [Value; 5] = match fields.try_into() {
        Ok(fields) => fields,
        Err(_) => exn::bail!(decode_error("changelog row does not have five fields")),
    };
    let [name, _version, _timestamp, action, serial] = fields;
    let serial = serial.as_int().ok_or_raise(|| decode_error("serial is not an integer"))?;
    Ok(RawChange {
        name: name.into_string().ok_or_raise(|| decode_error("name is not a string"))?,
        action: action.into_string().ok_or_raise(|| decode_error("action is not a string"))?,
        serial: Serial::try_from(serial).or_raise(|| decode_error("negative serial"))?,
    })
}

/// [`ChangelogFeed`] talking XML-RPC over HTTP.
#[derive(Clone, Debug)]
pub struct XmlRpcFeed {
    http: reqwest::Client,
    endpoint: String,
}
impl XmlRpcFeed {
    /// `endpoint` is the XML-RPC URL, e.g. `https://pypi.org/pypi`.
    pub fn new(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self { http, endpoint: endpoint.into() }
    }

    async fn call(&self, method: &str, params: &[i64]) -> Result<Value> {
        let transport = || ErrorKind::Transport(format!("{} ({method})", self.endpoint));
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(method_call(method, params))
            .send()
            .await
            .or_raise(transport)?;
        let status = response.status();
        if !status.is_success() {
            exn::bail!(ErrorKind::Status { url: self.endpoint.clone(), status: status.as_u16() });
        }
        let body = response.text().await.or_raise(transport)?;
        method_response(&body)
    }
}

#[async_trait]
impl ChangelogFeed for XmlRpcFeed {
    #[instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint))]
    async fn head(&self) -> Result<Serial> {
        let value = self.call("changelog_last_serial", &[]).await?;
        let serial = value.as_int().ok_or_raise(|| decode_error("last serial is not an integer"))?;
        Serial::try_from(serial).or_raise(|| decode_error("negative serial"))
    }

    #[instrument(level = "debug", skip(self), fields(endpoint = %self.endpoint))]
    async fn page_since(&self, cursor: Serial) -> Result<Page> {
        let cursor = i64::try_from(cursor).or_raise(|| decode_error("cursor out of range"))?;
        let Value::Array(rows) = self.call("changelog_since_serial", &[cursor]).await? else {
            exn::bail!(decode_error("changelog is not an array"));
        };
        let rows = rows.into_iter().map(raw_change).collect::<Result<Vec<_>>>()?;
        Ok(Page::decode(&rows))
    }
}
