//! AWS client construction for the queue and notification collaborators

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;

use super::config::AwsSettings;

/// Load shared SDK configuration, honouring explicit overrides before the
/// default provider chain.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }

    // LocalStack / ElasticMQ
    if let Some(endpoint) = &settings.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (&settings.access_key, &settings.secret_key) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "catalog-import");
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

pub fn sqs_client(config: &SdkConfig) -> aws_sdk_sqs::Client {
    aws_sdk_sqs::Client::new(config)
}

pub fn sns_client(config: &SdkConfig) -> aws_sdk_sns::Client {
    aws_sdk_sns::Client::new(config)
}
