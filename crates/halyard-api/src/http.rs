//! REST implementations of the client interfaces.
//!
//! The control plane exposes the model operations under `/api/v1`;
//! watchers are registered server-side and drained by long-polling
//! their `next` endpoint. Errors arrive as a `{code, message}` envelope
//! that decodes straight into [`ApiError`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use halyard_bundle::CharmUrl;

use crate::charms::{CharmSource, Macaroon};
use crate::client::{
    AddMachineArgs, AddMachineResult, Delta, ModelClient, ModelStatus, ModelWatcher,
    ServiceDeployArgs,
};
use crate::error::{ApiError, ApiResult};

/// A [`ModelClient`] over the control plane's REST API.
#[derive(Debug, Clone)]
pub struct HttpModelClient {
    base: String,
    http: reqwest::Client,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>) -> HttpModelClient {
        HttpModelClient {
            base: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> ApiResult<T> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::other(format!("control plane unreachable: {err}"))
}

/// Turn a response into its JSON body, decoding the error envelope on
/// non-success statuses.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ApiError::other(format!("malformed response: {e}")));
    }
    match response.json::<ApiError>().await {
        Ok(err) => Err(err),
        Err(_) => Err(ApiError::other(format!("request failed: {status}"))),
    }
}

#[derive(Serialize)]
struct AddCharmBody<'a> {
    url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    macaroon: Option<&'a Macaroon>,
}

#[derive(Serialize)]
struct SetYamlBody<'a> {
    config_yaml: &'a str,
}

#[derive(Deserialize)]
struct CharmUrlBody {
    url: String,
}

#[derive(Serialize)]
struct SetCharmBody<'a> {
    url: &'a str,
    force: bool,
}

#[derive(Serialize)]
struct AddUnitsBody<'a> {
    num_units: u32,
    machine_spec: &'a str,
}

#[derive(Deserialize)]
struct UnitsBody {
    units: Vec<String>,
}

#[derive(Serialize)]
struct AddRelationBody<'a> {
    endpoint1: &'a str,
    endpoint2: &'a str,
}

#[derive(Deserialize)]
struct WatcherBody {
    watcher: String,
}

#[derive(Serialize, Deserialize)]
struct Empty {}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn status(&self) -> ApiResult<ModelStatus> {
        self.get("/status").await
    }

    async fn add_charm(&self, url: &str) -> ApiResult<()> {
        let _: Empty = self
            .post("/charms", &AddCharmBody { url, macaroon: None })
            .await?;
        Ok(())
    }

    async fn add_charm_with_authorization(&self, url: &str, macaroon: &Macaroon) -> ApiResult<()> {
        let _: Empty = self
            .post(
                "/charms",
                &AddCharmBody {
                    url,
                    macaroon: Some(macaroon),
                },
            )
            .await?;
        Ok(())
    }

    async fn service_deploy(&self, args: ServiceDeployArgs) -> ApiResult<()> {
        let _: Empty = self.post("/services", &args).await?;
        Ok(())
    }

    async fn service_set_yaml(&self, service: &str, config_yaml: &str) -> ApiResult<()> {
        let _: Empty = self
            .post(
                &format!("/services/{service}/config"),
                &SetYamlBody { config_yaml },
            )
            .await?;
        Ok(())
    }

    async fn service_get_charm_url(&self, service: &str) -> ApiResult<String> {
        let body: CharmUrlBody = self.get(&format!("/services/{service}/charm-url")).await?;
        Ok(body.url)
    }

    async fn service_set_charm(&self, service: &str, url: &str, force: bool) -> ApiResult<()> {
        let _: Empty = self
            .post(
                &format!("/services/{service}/charm-url"),
                &SetCharmBody { url, force },
            )
            .await?;
        Ok(())
    }

    async fn add_machines(
        &self,
        machines: Vec<AddMachineArgs>,
    ) -> ApiResult<Vec<AddMachineResult>> {
        self.post("/machines", &machines).await
    }

    async fn add_service_units(
        &self,
        service: &str,
        num_units: u32,
        machine_spec: &str,
    ) -> ApiResult<Vec<String>> {
        let body: UnitsBody = self
            .post(
                &format!("/services/{service}/units"),
                &AddUnitsBody {
                    num_units,
                    machine_spec,
                },
            )
            .await?;
        Ok(body.units)
    }

    async fn add_relation(&self, endpoint1: &str, endpoint2: &str) -> ApiResult<()> {
        let _: Empty = self
            .post(
                "/relations",
                &AddRelationBody {
                    endpoint1,
                    endpoint2,
                },
            )
            .await?;
        Ok(())
    }

    async fn watch_all(&self) -> ApiResult<Box<dyn ModelWatcher>> {
        let body: WatcherBody = self.post("/watchers", &Empty {}).await?;
        Ok(Box::new(HttpWatcher {
            client: self.clone(),
            id: body.watcher,
        }))
    }
}

/// A server-side watcher drained over long-poll requests.
struct HttpWatcher {
    client: HttpModelClient,
    id: String,
}

#[async_trait]
impl ModelWatcher for HttpWatcher {
    async fn next(&mut self) -> ApiResult<Vec<Delta>> {
        self.client
            .post(&format!("/watchers/{}/next", self.id), &Empty {})
            .await
    }

    async fn stop(&mut self) -> ApiResult<()> {
        let response = self
            .client
            .http
            .delete(self.client.url(&format!("/watchers/{}", self.id)))
            .send()
            .await
            .map_err(transport)?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::other(format!(
                "cannot stop watcher: {}",
                response.status()
            )))
        }
    }
}

/// A [`CharmSource`] over the charm store / repository gateway.
#[derive(Debug, Clone)]
pub struct HttpCharmSource {
    base: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct MacaroonBody {
    macaroon: String,
}

impl HttpCharmSource {
    pub fn new(base_url: impl Into<String>) -> HttpCharmSource {
        HttpCharmSource {
            base: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CharmSource for HttpCharmSource {
    async fn resolve(&self, charm_ref: &str) -> ApiResult<CharmUrl> {
        let response = self
            .http
            .get(format!("{}/v1/charms/resolve", self.base))
            .query(&[("ref", charm_ref)])
            .send()
            .await
            .map_err(transport)?;
        let body: CharmUrlBody = decode(response).await?;
        CharmUrl::parse(&body.url)
            .map_err(|e| ApiError::other(format!("cannot parse resolved URL: {e}")))
    }

    async fn delegatable_macaroon(&self, url: &CharmUrl) -> ApiResult<Macaroon> {
        let response = self
            .http
            .get(format!("{}/v1/delegatable-macaroon", self.base))
            .query(&[("id", url.to_string())])
            .send()
            .await
            .map_err(transport)?;
        let body: MacaroonBody = decode(response).await?;
        Ok(Macaroon::new(body.macaroon))
    }
}
