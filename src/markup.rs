use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::AppError;
use crate::models::MarkupRecord;

pub const OPEN_GRAPH: &str = "OpenGraph";
pub const SCHEMA_CONTEXT: &str = "https://schema.org";
pub const EMPTY_HTML: &str = "<!-- No active schema markup -->";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedThing {
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub headline: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaqPage {
    #[serde(rename = "mainEntity")]
    pub main_entity: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Rendered as <meta property="og:*"> tags rather than JSON-LD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenGraph {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub og_type: Option<String>,
}

impl OpenGraph {
    pub fn meta_tags(&self) -> Vec<(&'static str, &str)> {
        let mut tags = vec![("og:title", self.title.as_str())];
        let optional = [
            ("og:description", &self.description),
            ("og:image", &self.image),
            ("og:url", &self.url),
            ("og:site_name", &self.site_name),
            ("og:locale", &self.locale),
            ("og:type", &self.og_type),
        ];
        for (property, value) in optional {
            if let Some(value) = value {
                tags.push((property, value.as_str()));
            }
        }
        tags
    }
}

// unknown types fall through to Other, which keeps the document as-is
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawPayload", try_from = "RawPayload")]
pub enum MarkupPayload {
    LocalBusiness(NamedThing),
    Organization(NamedThing),
    Product(NamedThing),
    Article(Article),
    FaqPage(FaqPage),
    OpenGraph(OpenGraph),
    Other {
        schema_type: String,
        document: Map<String, Value>,
    },
}

// storage/wire shape: {"type": "...", "payload": {...}}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub payload: Value,
}

impl MarkupPayload {
    pub fn parse(schema_type: &str, payload: Value) -> Result<Self, AppError> {
        let schema_type = schema_type.trim();
        if !is_type_name(schema_type) {
            return Err(AppError::validation(
                "type",
                format!("'{schema_type}' is not a valid schema type"),
            ));
        }
        if !payload.is_object() {
            return Err(AppError::validation("payload", "must be a JSON object"));
        }

        let parsed = match schema_type {
            "LocalBusiness" => MarkupPayload::LocalBusiness(named(payload)?),
            "Organization" => MarkupPayload::Organization(named(payload)?),
            "Product" => MarkupPayload::Product(named(payload)?),
            "Article" => {
                let article: Article = from_payload(payload)?;
                require_text("payload.headline", &article.headline)?;
                MarkupPayload::Article(article)
            }
            "FAQPage" => {
                let faq: FaqPage = from_payload(payload)?;
                if faq.main_entity.is_empty() {
                    return Err(AppError::validation(
                        "payload.mainEntity",
                        "needs at least one question",
                    ));
                }
                MarkupPayload::FaqPage(faq)
            }
            OPEN_GRAPH => {
                let og: OpenGraph = from_payload(payload)?;
                require_text("payload.title", &og.title)?;
                MarkupPayload::OpenGraph(og)
            }
            other => MarkupPayload::Other {
                schema_type: other.to_string(),
                document: match payload {
                    Value::Object(map) => map,
                    _ => Map::new(),
                },
            },
        };
        Ok(parsed)
    }

    pub fn schema_type(&self) -> &str {
        match self {
            MarkupPayload::LocalBusiness(_) => "LocalBusiness",
            MarkupPayload::Organization(_) => "Organization",
            MarkupPayload::Product(_) => "Product",
            MarkupPayload::Article(_) => "Article",
            MarkupPayload::FaqPage(_) => "FAQPage",
            MarkupPayload::OpenGraph(_) => OPEN_GRAPH,
            MarkupPayload::Other { schema_type, .. } => schema_type,
        }
    }

    pub fn is_open_graph(&self) -> bool {
        matches!(self, MarkupPayload::OpenGraph(_))
    }

    // the payload exactly as stored, without JSON-LD decoration
    pub fn raw(&self) -> Value {
        let value = match self {
            MarkupPayload::LocalBusiness(thing)
            | MarkupPayload::Organization(thing)
            | MarkupPayload::Product(thing) => serde_json::to_value(thing),
            MarkupPayload::Article(article) => serde_json::to_value(article),
            MarkupPayload::FaqPage(faq) => serde_json::to_value(faq),
            MarkupPayload::OpenGraph(og) => serde_json::to_value(og),
            MarkupPayload::Other { document, .. } => return Value::Object(document.clone()),
        };
        value.unwrap_or(Value::Null)
    }

    // JSON-LD gets @context/@type when missing; OpenGraph is returned as stored
    pub fn to_document(&self) -> Value {
        let raw = self.raw();
        if self.is_open_graph() {
            return raw;
        }

        let mut document = match raw {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        document
            .entry("@context")
            .or_insert_with(|| json!(SCHEMA_CONTEXT));
        document
            .entry("@type")
            .or_insert_with(|| json!(self.schema_type()));
        Value::Object(document)
    }
}

impl From<MarkupPayload> for RawPayload {
    fn from(payload: MarkupPayload) -> Self {
        RawPayload {
            schema_type: payload.schema_type().to_string(),
            payload: payload.raw(),
        }
    }
}

impl TryFrom<RawPayload> for MarkupPayload {
    type Error = AppError;

    fn try_from(raw: RawPayload) -> Result<Self, Self::Error> {
        MarkupPayload::parse(&raw.schema_type, raw.payload)
    }
}

fn is_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

fn from_payload<T: serde::de::DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    serde_json::from_value(payload).map_err(|e| AppError::validation("payload", e.to_string()))
}

fn named(payload: Value) -> Result<NamedThing, AppError> {
    let thing: NamedThing = from_payload(payload)?;
    require_text("payload.name", &thing.name)?;
    Ok(thing)
}

fn require_text(field: &'static str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(field, "must not be empty"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Html,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Html => "html",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Html => "text/html; charset=utf-8",
        }
    }

    pub fn render(&self, records: &[&MarkupRecord]) -> Result<String, serde_json::Error> {
        match self {
            Format::Json => render_json(records),
            Format::Html => render_html(records),
        }
    }
}

// enabled records applicable to `path`, newest first
pub fn select_public<'a>(records: &'a [MarkupRecord], path: Option<&str>) -> Vec<&'a MarkupRecord> {
    let mut selected: Vec<&MarkupRecord> = records
        .iter()
        .filter(|r| r.enabled && r.applies_to(path))
        .collect();
    selected.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    selected
}

pub fn render_json(records: &[&MarkupRecord]) -> Result<String, serde_json::Error> {
    let documents: Vec<Value> = records.iter().map(|r| r.payload.to_document()).collect();
    serde_json::to_string(&documents)
}

pub fn render_html(records: &[&MarkupRecord]) -> Result<String, serde_json::Error> {
    if records.is_empty() {
        return Ok(EMPTY_HTML.to_string());
    }

    let mut blocks = Vec::with_capacity(records.len());
    for record in records {
        match &record.payload {
            MarkupPayload::OpenGraph(og) => {
                for (property, content) in og.meta_tags() {
                    blocks.push(format!(
                        "<meta property=\"{}\" content=\"{}\" />",
                        property,
                        escape_html(content)
                    ));
                }
            }
            payload => {
                let json = serde_json::to_string(&payload.to_document())?;
                blocks.push(format!(
                    "<script type=\"application/ld+json\">{}</script>",
                    script_safe(&json)
                ));
            }
        }
    }
    Ok(blocks.join("\n"))
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// inside <script> entities are not decoded, so use JSON unicode escapes
fn script_safe(json: &str) -> String {
    json.replace('&', "\\u0026")
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn record(schema_type: &str, payload: Value, enabled: bool, age_secs: i64) -> MarkupRecord {
        let at = Utc::now() - Duration::seconds(age_secs);
        MarkupRecord {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            page_path: None,
            payload: MarkupPayload::parse(schema_type, payload).unwrap(),
            enabled,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn known_types_require_identity_field() {
        let err = MarkupPayload::parse("LocalBusiness", json!({"name": "  "})).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = MarkupPayload::parse("Product", json!({"price": 3})).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        let err = MarkupPayload::parse("FAQPage", json!({"mainEntity": []})).unwrap_err();
        assert_eq!(err.kind(), "validation_error");

        assert!(MarkupPayload::parse("Local Business", json!({})).is_err());
        assert!(MarkupPayload::parse("Thing", json!([1, 2])).is_err());
    }

    #[test]
    fn unknown_types_are_kept_opaque() {
        let doc = json!({"name": "Gig", "startDate": "2026-05-01"});
        let payload = MarkupPayload::parse("Event", doc.clone()).unwrap();
        assert_eq!(payload.schema_type(), "Event");
        assert_eq!(payload.raw(), doc);
        assert_eq!(payload.to_document()["@type"], "Event");
    }

    #[test]
    fn document_keeps_extra_fields_and_existing_context() {
        let payload = MarkupPayload::parse(
            "LocalBusiness",
            json!({"name": "Cafe", "telephone": "555", "@context": "http://schema.org"}),
        )
        .unwrap();
        let doc = payload.to_document();
        assert_eq!(doc["telephone"], "555");
        assert_eq!(doc["@context"], "http://schema.org");
        assert_eq!(doc["@type"], "LocalBusiness");
    }

    #[test]
    fn serde_shape_is_type_plus_payload() {
        let payload = MarkupPayload::parse("Organization", json!({"name": "Acme"})).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value, json!({"type": "Organization", "payload": {"name": "Acme"}}));

        let back: MarkupPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);

        let invalid = json!({"type": "Organization", "payload": {"name": ""}});
        assert!(serde_json::from_value::<MarkupPayload>(invalid).is_err());
    }

    #[test]
    fn public_selection_hides_disabled_and_orders_newest_first() {
        let records = vec![
            record("LocalBusiness", json!({"name": "Old"}), true, 300),
            record("Product", json!({"name": "Hidden"}), false, 10),
            record("Organization", json!({"name": "New"}), true, 5),
        ];
        let selected = select_public(&records, None);
        let names: Vec<_> = selected
            .iter()
            .map(|r| r.payload.raw()["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["New", "Old"]);

        let html = render_html(&selected).unwrap();
        assert!(!html.contains("Hidden"));
        let json = render_json(&selected).unwrap();
        assert!(!json.contains("Hidden"));
    }

    #[test]
    fn meta_tags_are_entity_escaped_but_json_is_raw() {
        let og = record(
            OPEN_GRAPH,
            json!({"title": "Tom & Jerry's <Diner>", "description": "say \"hi\""}),
            true,
            0,
        );
        let selected = vec![&og];

        let html = render_html(&selected).unwrap();
        assert!(html.contains(
            "<meta property=\"og:title\" content=\"Tom &amp; Jerry&#39;s &lt;Diner&gt;\" />"
        ));
        assert!(html.contains("content=\"say &quot;hi&quot;\""));

        let json: Value = serde_json::from_str(&render_json(&selected).unwrap()).unwrap();
        assert_eq!(json[0]["title"], "Tom & Jerry's <Diner>");
    }

    #[test]
    fn script_blocks_cannot_be_closed_by_payload() {
        let business = record("LocalBusiness", json!({"name": "</script><b>"}), true, 0);
        let html = render_html(&[&business]).unwrap();

        assert_eq!(html.matches("</script>").count(), 1);
        assert!(html.contains("\\u003c/script\\u003e\\u003cb\\u003e"));
        assert!(html.starts_with("<script type=\"application/ld+json\">"));
    }

    #[test]
    fn empty_sentinels() {
        assert_eq!(render_json(&[]).unwrap(), "[]");
        assert_eq!(render_html(&[]).unwrap(), EMPTY_HTML);
    }
}
