use geoalert::{BackendOrigin, GeoAlertClient};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Deserialize)]
pub struct Fixture {
    #[serde(rename = "_meta", default)]
    pub meta: FixtureMeta,
    pub request: FixtureRequest,
    pub response: FixtureResponse,
}

#[derive(Deserialize, Default)]
pub struct FixtureMeta {
    /// Query parameters the request must carry
    #[serde(default)]
    pub query: HashMap<String, String>,
    /// Query parameters the request must not carry
    #[serde(default)]
    pub absent_query: Vec<String>,
    /// Exact number of calls the mock must see
    pub expect: Option<u64>,
    /// Stop matching after this many calls
    pub up_to: Option<u64>,
}

#[derive(Deserialize)]
pub struct FixtureRequest {
    pub method: String,
    pub path: String,
}

#[derive(Deserialize)]
pub struct FixtureResponse {
    pub status_code: u16,
    /// JSON body
    pub body: Option<serde_json::Value>,
    /// Verbatim body, used when the exact bytes matter or the body is not JSON
    pub text: Option<String>,
}

pub struct GeoAlertMock {
    pub server: MockServer,
}

impl GeoAlertMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
    }

    pub fn load_fixture(fixture_path: &str) -> Fixture {
        let full_path = Self::fixtures_dir().join(fixture_path);

        let content = fs::read_to_string(&full_path)
            .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", full_path.display(), e));

        serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", full_path.display(), e))
    }

    pub async fn mount_fixture(&self, fixture_path: &str) {
        self.mount(Self::load_fixture(fixture_path)).await;
    }

    pub async fn mount(&self, fixture: Fixture) {
        let mut mock = Mock::given(method(fixture.request.method.as_str()))
            .and(path(fixture.request.path.as_str()));

        for (key, value) in &fixture.meta.query {
            mock = mock.and(query_param(key.as_str(), value.as_str()));
        }
        for key in &fixture.meta.absent_query {
            mock = mock.and(query_param_is_missing(key.as_str()));
        }

        let mut template = ResponseTemplate::new(fixture.response.status_code);
        if let Some(text) = &fixture.response.text {
            template = template.set_body_string(text.clone());
        } else if let Some(body) = &fixture.response.body {
            template = template.set_body_json(body);
        }

        let mut mock = mock.respond_with(template);
        if let Some(n) = fixture.meta.up_to {
            mock = mock.up_to_n_times(n);
        }
        if let Some(n) = fixture.meta.expect {
            mock = mock.expect(n);
        }
        mock.mount(&self.server).await;
    }

    /// Mounts a token endpoint issuing `token` for `expires_in_sec` seconds.
    pub async fn mount_token(&self, token: &str, expires_in_sec: u64, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/auth/issue-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token": token,
                "expiresInSec": expires_in_sec,
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    pub fn client(&self) -> GeoAlertClient {
        let origin =
            BackendOrigin::new(self.server.uri()).expect("mock server uri is a valid origin");
        GeoAlertClient::new(origin)
    }
}
