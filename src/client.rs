//! HTTP client for the bridge's REST API.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::bridge::BridgeApi;
use crate::errors::Error;
use crate::history::{HistorySummary, MessageHistory, MessageType};
use crate::light::{self, Light};
use crate::runtime::Mutex;
use crate::user::{CreatedUser, UserRegistration};

type Result<T> = std::result::Result<T, Error>;

/// Subset of `GET /api/config` that a bridge answers without credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub name: Option<String>,
    pub bridgeid: Option<String>,
    pub apiversion: Option<String>,
    pub swversion: Option<String>,
    pub modelid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: u16,
    #[serde(default)]
    address: String,
    #[serde(default)]
    description: String,
}

/// A session bound to one bridge and (once authenticated) one API username.
///
/// Request lines are kept in a bounded history with the username
/// redacted, so a failed run can report what was asked of the bridge.
///
/// # Example
///
/// ```no_run
/// use hue_pairing_rs::{BridgeApi, BridgeClient};
///
/// # async fn run() -> Result<(), hue_pairing_rs::Error> {
/// let client = BridgeClient::new(reqwest::Client::new(), "192.168.1.20", Some("abc"));
/// client.ping().await?;
/// for light in client.lights().await? {
///     println!("{} {}", light.id(), light.name());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BridgeClient {
    http: reqwest::Client,
    host: String,
    base_url: String,
    username: Option<String>,
    history: Arc<Mutex<MessageHistory>>,
}

impl BridgeClient {
    /// `host` is an IP or hostname, optionally with port. A full
    /// `http://` or `https://` URL is used as-is.
    pub fn new(http: reqwest::Client, host: &str, username: Option<&str>) -> Self {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("http://{host}")
        };
        BridgeClient {
            http,
            host: host.to_string(),
            base_url,
            username: username.filter(|u| !u.is_empty()).map(String::from),
            history: Arc::new(Mutex::new(MessageHistory::new())),
        }
    }

    /// Public bridge configuration; doubles as the liveness probe.
    pub async fn config(&self) -> Result<BridgeConfig> {
        let value = self.request(Method::GET, "/api/config", None).await?;
        serde_json::from_value(value).map_err(Error::JsonLoad)
    }

    /// Fetch one light by id.
    pub async fn light(&self, id: &str) -> Result<Light> {
        let path = self.user_path(&format!("/lights/{id}"))?;
        let value = self.request(Method::GET, &path, None).await?;
        let light: Light = serde_json::from_value(value).map_err(Error::JsonLoad)?;
        Ok(light.with_id(id))
    }

    fn user_path(&self, suffix: &str) -> Result<String> {
        let username = self.username.as_deref().ok_or(Error::NotAuthenticated)?;
        Ok(format!("/api/{username}{suffix}"))
    }

    /// Replace path segments equal to the username.
    fn redact(&self, path: &str) -> String {
        match self.username.as_deref() {
            Some(username) => path
                .split('/')
                .map(|segment| if segment == username { "<user>" } else { segment })
                .collect::<Vec<_>>()
                .join("/"),
            None => path.to_string(),
        }
    }

    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let label = format!("{method} {}", self.redact(path));
        self.history.lock().await.record(MessageType::Send, &label);

        let result = self.send(method, path, body).await;
        let mut history = self.history.lock().await;
        match &result {
            Ok(_) => history.record(MessageType::Receive, &label),
            Err(e) => history.record_error(&format!("{label}: {e}")),
        }
        result
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        debug!("{method} {}", self.redact(path));

        let mut builder = self.http.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let resp = builder
            .send().await
            .map_err(|e| Error::http("send", e.without_url()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                path: self.redact(path),
                status: status.as_u16(),
            });
        }

        let bytes = resp
            .bytes().await
            .map_err(|e| Error::http("receive", e.without_url()))?;
        let value: Value = serde_json::from_slice(&bytes).map_err(Error::JsonLoad)?;
        debug!("{} answered {status}", self.redact(path));

        match first_error(&value) {
            Some(err) => Err(err),
            None => Ok(value),
        }
    }
}

/// Hue reports failures as `[{"error": {...}}]` with HTTP 200.
fn first_error(value: &Value) -> Option<Error> {
    value
        .as_array()?
        .iter()
        .filter_map(|entry| entry.get("error"))
        .find_map(|err| serde_json::from_value::<ApiError>(err.clone()).ok())
        .map(|err| Error::Bridge {
            kind: err.kind,
            address: err.address,
            description: err.description,
        })
}

impl BridgeApi for BridgeClient {
    fn host(&self) -> &str {
        &self.host
    }

    fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn set_username(&mut self, username: String) {
        self.username = Some(username);
    }

    async fn ping(&self) -> Result<()> {
        let config = self.config().await?;
        debug!(
            "bridge {} answered ping (api {})",
            config.bridgeid.as_deref().unwrap_or("?"),
            config.apiversion.as_deref().unwrap_or("?")
        );
        Ok(())
    }

    async fn create_user(&self, registration: &UserRegistration) -> Result<String> {
        let body = serde_json::to_value(registration.request()).map_err(Error::JsonDump)?;
        let value = self.request(Method::POST, "/api", Some(body)).await?;

        let success = value
            .as_array()
            .and_then(|entries| entries.iter().find_map(|e| e.get("success")))
            .cloned()
            .unwrap_or(Value::Null);
        let created: CreatedUser = serde_json::from_value(success).map_err(Error::JsonLoad)?;
        Ok(created.username)
    }

    async fn delete_user(&self, username: &str) -> Result<()> {
        let path = self.user_path(&format!("/config/whitelist/{username}"))?;
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn scan_for_new_lights(&self) -> Result<()> {
        let path = self.user_path("/lights")?;
        self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    async fn new_lights(&self) -> Result<Vec<Light>> {
        let path = self.user_path("/lights/new")?;
        let value = self.request(Method::GET, &path, None).await?;
        let ids: Vec<String> = value
            .as_object()
            .map(|found| {
                found
                    .keys()
                    .filter(|key| key.as_str() != "lastscan")
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let mut lights = futures::future::try_join_all(ids.iter().map(|id| self.light(id))).await?;
        light::sort_by_id(&mut lights);
        Ok(lights)
    }

    async fn lights(&self) -> Result<Vec<Light>> {
        let path = self.user_path("/lights")?;
        let value = self.request(Method::GET, &path, None).await?;
        let by_id: BTreeMap<String, Light> =
            serde_json::from_value(value).map_err(Error::JsonLoad)?;

        let mut lights: Vec<Light> = by_id
            .into_iter()
            .map(|(id, light)| light.with_id(&id))
            .collect();
        light::sort_by_id(&mut lights);
        Ok(lights)
    }

    async fn save_light(&self, light: &Light) -> Result<()> {
        let path = self.user_path(&format!("/lights/{}/state", light.id()))?;
        let body = serde_json::to_value(light.state_update()).map_err(Error::JsonDump)?;
        self.request(Method::PUT, &path, Some(body)).await?;
        Ok(())
    }

    async fn touchlink(&self) -> Result<()> {
        let path = self.user_path("/config")?;
        self.request(Method::PUT, &path, Some(json!({"touchlink": true}))).await?;
        Ok(())
    }

    async fn diagnostics(&self) -> Option<HistorySummary> {
        Some(self.history.lock().await.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup(username: Option<&str>) -> (MockServer, BridgeClient) {
        let server = MockServer::start().await;
        let client = BridgeClient::new(reqwest::Client::new(), &server.uri(), username);
        (server, client)
    }

    fn lamp(name: &str, on: bool) -> Value {
        json!({"name": name, "type": "Color light", "state": {"on": on, "reachable": true}})
    }

    #[tokio::test]
    async fn test_ping() {
        let (server, client) = setup(None).await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Philips hue",
                "bridgeid": "001788FFFE23BFC2",
                "apiversion": "1.26.0"
            })))
            .expect(2)
            .mount(&server).await;

        client.ping().await.unwrap();
        let config = client.config().await.unwrap();
        assert_eq!(config.name.as_deref(), Some("Philips hue"));
    }

    #[tokio::test]
    async fn test_ping_unreachable() {
        let client = BridgeClient::new(reqwest::Client::new(), "http://127.0.0.1:9", None);
        assert!(matches!(client.ping().await, Err(Error::Http { .. })));
    }

    #[tokio::test]
    async fn test_ping_server_error() {
        let (server, client) = setup(None).await;
        Mock::given(method("GET"))
            .and(path("/api/config"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server).await;

        assert!(matches!(
            client.ping().await,
            Err(Error::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_create_user() {
        let (server, client) = setup(None).await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .and(body_json(json!({"devicetype": "living-on-hue#cli"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "success": {"username": "83b7780291a6ceffbe0bd049104df"}
            }])))
            .mount(&server).await;

        let registration = UserRegistration::new("living-on-hue", "cli").unwrap();
        let username = client.create_user(&registration).await.unwrap();
        assert_eq!(username, "83b7780291a6ceffbe0bd049104df");
    }

    #[tokio::test]
    async fn test_create_user_link_button_not_pressed() {
        let (server, client) = setup(None).await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "error": {"type": 101, "address": "", "description": "link button not pressed"}
            }])))
            .mount(&server).await;

        let registration = UserRegistration::new("living-on-hue", "cli").unwrap();
        let err = client.create_user(&registration).await.unwrap_err();
        assert!(err.is_link_button_not_pressed());

        let summary = client.diagnostics().await.unwrap();
        assert_eq!(summary.send_count, 1);
        assert_eq!(summary.receive_count, 0);
        assert_eq!(summary.last_request.as_deref(), Some("POST /api"));
        assert!(summary.last_error.unwrap().contains("link button"));
    }

    #[tokio::test]
    async fn test_requires_username() {
        let (_server, client) = setup(None).await;
        assert!(matches!(
            client.lights().await,
            Err(Error::NotAuthenticated)
        ));
        assert!(matches!(
            client.touchlink().await,
            Err(Error::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_delete_user() {
        let (server, client) = setup(Some("abc")).await;
        Mock::given(method("DELETE"))
            .and(path("/api/abc/config/whitelist/abc"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"success": "/config/whitelist/abc deleted"}])),
            )
            .expect(1)
            .mount(&server).await;

        client.delete_user("abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_unauthorized_user() {
        let (server, client) = setup(Some("stale")).await;
        Mock::given(method("GET"))
            .and(path("/api/stale/lights"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "error": {"type": 1, "address": "/lights", "description": "unauthorized user"}
            }])))
            .mount(&server).await;

        match client.lights().await {
            Err(Error::Bridge { kind, address, .. }) => {
                assert_eq!(kind, Error::UNAUTHORIZED_USER);
                assert_eq!(address, "/lights");
            }
            other => panic!("expected bridge error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_scan_and_new_lights() {
        let (server, client) = setup(Some("abc")).await;
        Mock::given(method("POST"))
            .and(path("/api/abc/lights"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"success": {"/lights": "Searching for new devices"}}
            ])))
            .expect(1)
            .mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/abc/lights/new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "12": {"name": "LivingColors 2"},
                "7": {"name": "LivingColors 1"},
                "lastscan": "2012-10-29T12:00:00"
            })))
            .mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/abc/lights/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lamp("LivingColors 1", true)))
            .mount(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/abc/lights/12"))
            .respond_with(ResponseTemplate::new(200).set_body_json(lamp("LivingColors 2", false)))
            .mount(&server).await;

        client.scan_for_new_lights().await.unwrap();
        let lights = client.new_lights().await.unwrap();

        let ids: Vec<&str> = lights.iter().map(Light::id).collect();
        assert_eq!(ids, ["7", "12"]);
        assert!(lights[0].is_on());
        assert!(!lights[1].is_on());
    }

    #[tokio::test]
    async fn test_no_new_lights() {
        let (server, client) = setup(Some("abc")).await;
        Mock::given(method("GET"))
            .and(path("/api/abc/lights/new"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"lastscan": "active"})),
            )
            .mount(&server).await;

        assert!(client.new_lights().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_lights_sorted() {
        let (server, client) = setup(Some("abc")).await;
        Mock::given(method("GET"))
            .and(path("/api/abc/lights"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "10": lamp("Hall", false),
                "2": lamp("Desk", true),
                "1": lamp("Kitchen", true)
            })))
            .mount(&server).await;

        let lights = client.lights().await.unwrap();
        let names: Vec<&str> = lights.iter().map(Light::name).collect();
        assert_eq!(names, ["Kitchen", "Desk", "Hall"]);
    }

    #[tokio::test]
    async fn test_save_light() {
        let (server, client) = setup(Some("abc")).await;
        Mock::given(method("PUT"))
            .and(path("/api/abc/lights/3/state"))
            .and(body_json(json!({"on": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"success": {"/lights/3/state/on": false}}
            ])))
            .expect(1)
            .mount(&server).await;

        let mut light = Light::new("3", "LivingColors 1", true);
        light.set_on(false);
        client.save_light(&light).await.unwrap();
    }

    #[tokio::test]
    async fn test_touchlink() {
        let (server, client) = setup(Some("abc")).await;
        Mock::given(method("PUT"))
            .and(path("/api/abc/config"))
            .and(body_json(json!({"touchlink": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"success": {"/config/touchlink": true}}
            ])))
            .expect(1)
            .mount(&server).await;

        client.touchlink().await.unwrap();
    }

    #[tokio::test]
    async fn test_history_redacts_username() {
        let (server, client) = setup(Some("secret-user")).await;
        Mock::given(method("PUT"))
            .and(path("/api/secret-user/config"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server).await;

        client.touchlink().await.unwrap();
        let summary = client.diagnostics().await.unwrap();
        assert_eq!(
            summary.recent,
            ["> PUT /api/<user>/config", "< PUT /api/<user>/config"]
        );
    }

    #[tokio::test]
    async fn test_history_redacts_short_username() {
        let (server, client) = setup(Some("a")).await;
        Mock::given(method("DELETE"))
            .and(path("/api/a/config/whitelist/a"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server).await;

        client.delete_user("a").await.unwrap();
        let summary = client.diagnostics().await.unwrap();
        assert_eq!(
            summary.last_request.as_deref(),
            Some("DELETE /api/<user>/config/whitelist/<user>")
        );
    }

    #[tokio::test]
    async fn test_history_never_holds_issued_username() {
        let (server, mut client) = setup(None).await;
        Mock::given(method("POST"))
            .and(path("/api"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"success": {"username": "fresh-secret"}}])),
            )
            .mount(&server).await;

        let registration = UserRegistration::new("living-on-hue", "cli").unwrap();
        let username = client.create_user(&registration).await.unwrap();
        client.set_username(username);

        let summary = client.diagnostics().await.unwrap();
        assert_eq!(summary.recent, ["> POST /api", "< POST /api"]);
        assert!(!format!("{summary:?}").contains("fresh-secret"));
    }

    #[tokio::test]
    async fn test_transport_error_hides_username() {
        let client =
            BridgeClient::new(reqwest::Client::new(), "http://127.0.0.1:9", Some("secret"));
        let err = client.lights().await.unwrap_err();
        assert!(matches!(err, Error::Http { .. }));
        assert!(!err.to_string().contains("secret"));

        let summary = client.diagnostics().await.unwrap();
        assert!(!summary.last_error.unwrap().contains("secret"));
    }

    #[test]
    fn test_base_url() {
        let client = BridgeClient::new(reqwest::Client::new(), "10.0.0.5", None);
        assert_eq!(client.base_url, "http://10.0.0.5");
        assert_eq!(client.host(), "10.0.0.5");
        assert_eq!(client.username(), None);

        let client = BridgeClient::new(reqwest::Client::new(), "https://bridge.local/", Some(""));
        assert_eq!(client.base_url, "https://bridge.local");
        assert_eq!(client.username(), None);
    }
}
