//! Payment provider API client implementation.

use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;

use super::types::{
    CheckoutAttributes, CheckoutData, CheckoutRelationships, CheckoutRequestAttributes,
    CheckoutSession, CreateCheckoutData, CreateCheckoutRequest, CustomData, Envelope,
    ProductOptions, ProviderErrorResponse, ProviderSubscription, Relationship, RelationshipData,
    SubscriptionAttributes,
};

/// Maximum attempts per provider call (1 initial + retries).
const MAX_ATTEMPTS: u32 = 3;

/// Base delay before the first retry; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Error type for provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider API returned an error.
    #[error("provider API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the provider, if any.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing configuration for this operation.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    /// Whether the failure is worth retrying: connection-level errors,
    /// timeouts, rate limiting, and provider-side 5xx.
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            Self::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            Self::Serialization(_) | Self::Configuration(_) => false,
        }
    }
}

/// Payment provider API client.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ProviderClient {
    /// Create a new provider client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (does not happen with
    /// default TLS settings).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Create a hosted checkout session for the Pro plan.
    ///
    /// The account id rides along in the checkout's custom data, so the
    /// resulting subscription webhooks resolve directly without any
    /// email/customer-id fallback.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the provider
    /// rejects it.
    pub async fn create_checkout(
        &self,
        store_id: &str,
        variant_id: &str,
        email: &str,
        account_id: &str,
        redirect_url: &str,
    ) -> Result<CheckoutSession, ProviderError> {
        let request = CreateCheckoutRequest {
            data: CreateCheckoutData {
                kind: "checkouts",
                attributes: CheckoutRequestAttributes {
                    checkout_data: CheckoutData {
                        email: email.to_string(),
                        custom: CustomData {
                            user_id: account_id.to_string(),
                        },
                    },
                    product_options: ProductOptions {
                        redirect_url: redirect_url.to_string(),
                    },
                },
                relationships: CheckoutRelationships {
                    store: Relationship {
                        data: RelationshipData {
                            kind: "stores",
                            id: store_id.to_string(),
                        },
                    },
                    variant: Relationship {
                        data: RelationshipData {
                            kind: "variants",
                            id: variant_id.to_string(),
                        },
                    },
                },
            },
        };
        let body = serde_json::to_value(&request)?;

        let envelope: Envelope<CheckoutAttributes> = self
            .request(Method::POST, "/v1/checkouts", Some(&body))
            .await?;

        Ok(CheckoutSession {
            id: envelope.data.id,
            url: envelope.data.attributes.url,
        })
    }

    /// Fetch a subscription by its provider id.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the provider
    /// rejects it. An unknown id is an `Api` error with status 404.
    pub async fn get_subscription(&self, id: &str) -> Result<ProviderSubscription, ProviderError> {
        let path = format!("/v1/subscriptions/{id}");
        let envelope: Envelope<SubscriptionAttributes> =
            self.request(Method::GET, &path, None).await?;

        Ok(envelope.data.attributes.into_subscription(envelope.data.id))
    }

    /// Cancel a subscription. The provider keeps it active until the end of
    /// the paid period and then sends `subscription_expired`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the provider
    /// rejects it.
    pub async fn cancel_subscription(
        &self,
        id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        let path = format!("/v1/subscriptions/{id}");
        let envelope: Envelope<SubscriptionAttributes> =
            self.request(Method::DELETE, &path, None).await?;

        Ok(envelope.data.attributes.into_subscription(envelope.data.id))
    }

    /// Customer-portal URL for a subscription, when the provider exposes one.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription fetch fails.
    pub async fn customer_portal_url(&self, id: &str) -> Result<Option<String>, ProviderError> {
        let subscription = self.get_subscription(id).await?;
        Ok(subscription.urls.and_then(|u| u.customer_portal))
    }

    /// Issue a request with bounded retry on transient failures.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = self.send_once(method.clone(), &url, body).await;
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt,
                        delay = ?delay,
                        error = %e,
                        "provider request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T, ProviderError> {
        let mut request = self
            .client
            .request(method, url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "application/vnd.api+json");

        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/vnd.api+json")
                .json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .json::<ProviderErrorResponse>()
                .await
                .ok()
                .and_then(|e| e.errors.into_iter().next())
                .map_or_else(|| "unknown error".to_string(), |d| d.detail);

            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }
}
