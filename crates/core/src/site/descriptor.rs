use serde_json::{json, Map, Value};

/// Per-call values layered on top of a stored catalog row.
///
/// Every `Some` wins over the stored value; `None` falls back to it.
#[derive(Debug, Clone, Default)]
pub struct SiteOverrides {
    pub site_id: Option<String>,
    pub name: Option<String>,
    pub cookie: Option<String>,
    pub api_key: Option<String>,
    pub ua: Option<String>,
    pub rule: Option<String>,
    pub public: Option<bool>,
    pub proxy: Option<bool>,
    pub parser: Option<String>,
    pub render: Option<bool>,
    pub language: Option<String>,
    pub priority: Option<i32>,
    /// Row comes from the packaged catalog. Enables batch search.
    pub builtin: bool,
}

/// Everything needed to query one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteDescriptor {
    pub id: String,
    /// Local id of the configured site row, used for rate limiting.
    pub site_id: Option<String>,
    pub name: String,
    pub domain: String,
    pub search: Value,
    /// `search.batch` for builtin sites; `None` means batch search is unsupported.
    pub batch: Option<Value>,
    pub browse: Value,
    pub torrents: Value,
    pub category: Value,
    /// CSS selectors for the detail page (`free`, `2xfree`, `hr`, `peer_count`).
    pub detail: Value,
    pub parser: Option<String>,
    pub render: bool,
    pub cookie: Option<String>,
    pub ua: Option<String>,
    pub api_key: Option<String>,
    pub proxy: bool,
    pub rule: Option<String>,
    pub public: bool,
    pub language: Option<String>,
    pub priority: i32,
    pub builtin: bool,
}

impl SiteDescriptor {
    /// Build a descriptor from a raw catalog row.
    ///
    /// Returns `None` when the row is not an object or has no domain.
    pub fn from_raw(raw: &Value, overrides: &SiteOverrides) -> Option<Self> {
        let obj = raw.as_object()?;
        let domain = str_field(obj, "domain")?;

        let search = object_field(obj, "search");
        let batch = if overrides.builtin {
            search
                .get("batch")
                .filter(|b| b.as_object().is_some_and(|m| !m.is_empty()))
                .cloned()
        } else {
            None
        };

        let priority = match overrides.priority {
            Some(p) => p,
            None => obj.get("pri").map(parse_priority).unwrap_or(0),
        };

        Some(Self {
            id: str_field(obj, "id").unwrap_or_default(),
            site_id: overrides
                .site_id
                .clone()
                .or_else(|| str_field(obj, "siteid")),
            name: overrides
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .or_else(|| str_field(obj, "name"))
                .unwrap_or_default(),
            domain,
            batch,
            search,
            browse: object_field(obj, "browse"),
            torrents: object_field(obj, "torrents"),
            category: object_field(obj, "category"),
            detail: object_field(obj, "detail"),
            parser: overrides
                .parser
                .clone()
                .or_else(|| str_field(obj, "parser")),
            render: overrides
                .render
                .unwrap_or_else(|| bool_field(obj, "render")),
            cookie: overrides
                .cookie
                .clone()
                .filter(|c| !c.is_empty())
                .or_else(|| str_field(obj, "cookie")),
            ua: overrides
                .ua
                .clone()
                .filter(|u| !u.is_empty())
                .or_else(|| str_field(obj, "ua")),
            api_key: overrides
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .or_else(|| str_field(obj, "apikey")),
            proxy: overrides.proxy.unwrap_or_else(|| bool_field(obj, "proxy")),
            rule: overrides.rule.clone().or_else(|| str_field(obj, "rule")),
            public: overrides
                .public
                .unwrap_or_else(|| bool_field(obj, "public")),
            language: overrides
                .language
                .clone()
                .or_else(|| str_field(obj, "language")),
            priority,
            builtin: overrides.builtin,
        })
    }

    /// Serialize back to the raw catalog shape accepted by [`Self::from_raw`].
    pub fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "siteid": self.site_id.clone().unwrap_or_default(),
            "name": self.name,
            "builtin": self.builtin,
            "domain": self.domain,
            "search": self.search,
            "batch": self.batch.clone().unwrap_or_else(|| json!({})),
            "parser": self.parser.clone().unwrap_or_default(),
            "render": self.render,
            "browse": self.browse,
            "torrents": self.torrents,
            "category": self.category,
            "detail": self.detail,
            "cookie": self.cookie.clone().unwrap_or_default(),
            "ua": self.ua.clone().unwrap_or_default(),
            "apikey": self.api_key.clone().unwrap_or_default(),
            "rule": self.rule.clone().unwrap_or_default(),
            "public": self.public,
            "proxy": self.proxy,
            "language": self.language.clone().unwrap_or_default(),
            "pri": self.priority,
        })
    }

    /// Id used for rate limiting and statistics: the configured row id, else the catalog id.
    pub fn limiter_key(&self) -> &str {
        self.site_id.as_deref().unwrap_or(&self.id)
    }
}

/// Falsy-tolerant priority: null, 0, "", false and non-numeric all read as 0.
pub fn parse_priority(value: &Value) -> i32 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|n| i32::try_from(n).ok())
            .unwrap_or(0),
        Value::String(s) => s.trim().parse::<i32>().unwrap_or(0),
        Value::Bool(true) => 1,
        _ => 0,
    }
}

fn str_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn bool_field(obj: &Map<String, Value>, key: &str) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "Y" | "y" | "true" | "1"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn object_field(obj: &Map<String, Value>, key: &str) -> Value {
    match obj.get(key) {
        Some(v @ Value::Object(_)) => v.clone(),
        _ => Value::Object(Map::new()),
    }
}
