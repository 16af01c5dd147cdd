use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// App name used when the caller does not provide one.
pub const DEFAULT_APP_NAME: &str = "unleash-rust-client";

/// Context keys that map to dedicated [`Context`] fields rather than `properties`.
pub const WELL_KNOWN_CONTEXT_KEYS: [&str; 5] =
    ["appName", "environment", "userId", "sessionId", "remoteAddress"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub value: String,
}

impl Payload {
    pub fn new(payload_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            payload_type: payload_type.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub enabled: bool,
    /// Whether the parent toggle is enabled. Lets callers tell a disabled
    /// variant apart from a variant that is off because its feature is off.
    #[serde(
        rename = "feature_enabled",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub feature_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

impl Variant {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            feature_enabled: None,
            payload: None,
        }
    }

    /// The variant returned when a toggle is unknown or carries no variant.
    pub fn disabled() -> Self {
        Self {
            name: "disabled".to_string(),
            enabled: false,
            feature_enabled: Some(false),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_feature_enabled(mut self, feature_enabled: bool) -> Self {
        self.feature_enabled = Some(feature_enabled);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toggle {
    pub name: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<Variant>,
    #[serde(default)]
    pub impression_data: bool,
}

impl Toggle {
    pub fn new(name: impl Into<String>, enabled: bool) -> Self {
        Self {
            name: name.into(),
            enabled,
            variant: None,
            impression_data: false,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_impression_data(mut self, impression_data: bool) -> Self {
        self.impression_data = impression_data;
        self
    }
}

/// Body of a successful toggle fetch, also the shape of bootstrap files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureResponse {
    pub toggles: Vec<Toggle>,
}

/// Evaluation context sent as query parameters on every fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub app_name: String,
    pub environment: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub remote_address: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(DEFAULT_APP_NAME)
    }
}

impl Context {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            environment: None,
            user_id: None,
            session_id: None,
            remote_address: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Compute a new context from caller-supplied keys.
    ///
    /// `appName` and `environment` keep their current values unless present in
    /// `fields`. `userId`, `sessionId` and `remoteAddress` are taken from
    /// `fields` only. Any other key becomes a property, and `properties` is
    /// merged last.
    pub fn updated(
        &self,
        fields: &HashMap<String, String>,
        properties: Option<&HashMap<String, String>>,
    ) -> Context {
        let mut new_properties = BTreeMap::new();
        for (key, value) in fields {
            if !is_well_known_key(key) {
                new_properties.insert(key.clone(), value.clone());
            }
        }
        if let Some(properties) = properties {
            for (key, value) in properties {
                if !is_well_known_key(key) {
                    new_properties.insert(key.clone(), value.clone());
                }
            }
        }

        Context {
            app_name: fields
                .get("appName")
                .cloned()
                .unwrap_or_else(|| self.app_name.clone()),
            environment: fields
                .get("environment")
                .cloned()
                .or_else(|| self.environment.clone()),
            user_id: fields.get("userId").cloned(),
            session_id: fields.get("sessionId").cloned(),
            remote_address: fields.get("remoteAddress").cloned(),
            properties: new_properties,
        }
    }

    /// Flatten into query parameters: well-known keys first, then
    /// `properties[key]` pairs ordered by key.
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("appName".to_string(), self.app_name.clone())];
        if let Some(ref environment) = self.environment {
            pairs.push(("environment".to_string(), environment.clone()));
        }
        if let Some(ref user_id) = self.user_id {
            pairs.push(("userId".to_string(), user_id.clone()));
        }
        if let Some(ref session_id) = self.session_id {
            pairs.push(("sessionId".to_string(), session_id.clone()));
        }
        if let Some(ref remote_address) = self.remote_address {
            pairs.push(("remoteAddress".to_string(), remote_address.clone()));
        }
        for (key, value) in &self.properties {
            pairs.push((format!("properties[{}]", key), value.clone()));
        }
        pairs
    }

    /// Percent-encoded query string. Keys and values are encoded separately,
    /// leaving only the RFC 3986 unreserved characters as is.
    pub fn to_query_string(&self) -> String {
        self.to_query_pairs()
            .iter()
            .map(|(key, value)| {
                format!("{}={}", urlencoding::encode(key), urlencoding::encode(value))
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

pub fn is_well_known_key(key: &str) -> bool {
    WELL_KNOWN_CONTEXT_KEYS.contains(&key)
}

pub struct ContextBuilder {
    context: Context,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            context: Context::default(),
        }
    }

    pub fn app_name(mut self, app_name: impl Into<String>) -> Self {
        self.context.app_name = app_name.into();
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.context.environment = Some(environment.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.context.user_id = Some(user_id.into());
        self
    }

    pub fn session_id(mut self, session_id: impl Into<String>) -> Self {
        self.context.session_id = Some(session_id.into());
        self
    }

    pub fn remote_address(mut self, remote_address: impl Into<String>) -> Self {
        self.context.remote_address = Some(remote_address.into());
        self
    }

    /// Add a custom property. Well-known keys are routed to their fields.
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match key.as_str() {
            "appName" => self.context.app_name = value,
            "environment" => self.context.environment = Some(value),
            "userId" => self.context.user_id = Some(value),
            "sessionId" => self.context.session_id = Some(value),
            "remoteAddress" => self.context.remote_address = Some(value),
            _ => {
                self.context.properties.insert(key, value);
            }
        }
        self
    }

    pub fn build(self) -> Context {
        self.context
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_toggle_deserialization_defaults() {
        let toggle: Toggle = serde_json::from_str(r#"{"name":"foo","enabled":true}"#).unwrap();
        assert_eq!(toggle.name, "foo");
        assert!(toggle.enabled);
        assert!(toggle.variant.is_none());
        assert!(!toggle.impression_data);
    }

    #[test]
    fn test_variant_wire_names() {
        let json = r#"{
            "name": "flag",
            "enabled": true,
            "impressionData": true,
            "variant": {
                "name": "blue",
                "enabled": true,
                "feature_enabled": true,
                "payload": {"type": "string", "value": "navy"}
            }
        }"#;
        let toggle: Toggle = serde_json::from_str(json).unwrap();
        let variant = toggle.variant.unwrap();

        assert!(toggle.impression_data);
        assert_eq!(variant.feature_enabled, Some(true));
        assert_eq!(variant.payload, Some(Payload::new("string", "navy")));
    }

    #[test]
    fn test_disabled_variant() {
        let variant = Variant::disabled();
        assert_eq!(variant.name, "disabled");
        assert!(!variant.enabled);
        assert_eq!(variant.feature_enabled, Some(false));
        assert!(variant.payload.is_none());
    }

    #[test]
    fn test_query_string_encoding() {
        let context = Context::builder()
            .app_name("my app")
            .user_id("a&b=c")
            .property("tier", "gold~1")
            .build();

        assert_eq!(
            context.to_query_string(),
            "appName=my%20app&userId=a%26b%3Dc&properties%5Btier%5D=gold~1"
        );
    }

    #[test]
    fn test_builder_routes_well_known_properties() {
        let context = Context::builder().property("userId", "u1").build();

        assert_eq!(context.user_id, Some("u1".to_string()));
        assert!(context.properties.is_empty());
    }

    #[test]
    fn test_updated_preserves_app_name_and_environment() {
        let base = Context::builder().app_name("app").environment("env").build();

        let updated = base.updated(&fields(&[("userId", "u1")]), None);

        assert_eq!(updated.app_name, "app");
        assert_eq!(updated.environment, Some("env".to_string()));
        assert_eq!(updated.user_id, Some("u1".to_string()));
        assert!(updated.properties.is_empty());

        let query = updated.to_query_string();
        assert!(query.contains("appName=app"));
        assert!(query.contains("environment=env"));
        assert!(query.contains("userId=u1"));
        assert!(!query.contains("properties%5BuserId%5D"));
    }

    #[test]
    fn test_updated_routes_custom_keys_to_properties() {
        let base = Context::builder().app_name("app").user_id("old").build();
        let extra = fields(&[("region", "eu"), ("tier", "gold")]);

        let updated = base.updated(&fields(&[("region", "us"), ("sessionId", "s1")]), Some(&extra));

        assert_eq!(updated.user_id, None);
        assert_eq!(updated.session_id, Some("s1".to_string()));
        assert_eq!(updated.properties.get("region"), Some(&"eu".to_string()));
        assert_eq!(updated.properties.get("tier"), Some(&"gold".to_string()));
    }

    #[test]
    fn test_updated_overrides_environment_when_supplied() {
        let base = Context::builder().environment("env").build();
        let updated = base.updated(&fields(&[("environment", "prod")]), None);
        assert_eq!(updated.environment, Some("prod".to_string()));
    }
}
