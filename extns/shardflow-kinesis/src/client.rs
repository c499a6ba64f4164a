use aws_config::{BehaviorVersion, Region, meta::region::RegionProviderChain};

use crate::Result;
use crate::source::KinesisSourceConfig;

/// Creates and configures a Kinesis client based on the provided
/// configuration.
pub async fn create_kinesis_client(config: &KinesisSourceConfig) -> Result<aws_sdk_kinesis::Client> {
    config.validate()?;

    tracing::info!(
        region = config.region.clone(),
        "Creating Kinesis client in region"
    );

    let shared_config = shared_config(config).await;
    Ok(aws_sdk_kinesis::Client::new(&shared_config))
}

/// Creates the CloudWatch client used for the stream's incoming-bytes
/// metric, pointed at the same region/endpoint as the Kinesis client.
pub async fn create_cloudwatch_client(
    config: &KinesisSourceConfig,
) -> Result<aws_sdk_cloudwatch::Client> {
    config.validate()?;

    let shared_config = shared_config(config).await;
    Ok(aws_sdk_cloudwatch::Client::new(&shared_config))
}

async fn shared_config(config: &KinesisSourceConfig) -> aws_config::SdkConfig {
    let region_provider = RegionProviderChain::first_try(Region::new(config.region.clone()))
        .or_default_provider()
        .or_else(Region::new("us-west-2")); // Default region if none provided

    let mut config_builder = aws_config::defaults(BehaviorVersion::v2024_03_28()).region(region_provider);

    // Apply endpoint URL if configured
    if let Some(endpoint_url) = &config.endpoint_url {
        config_builder = config_builder.endpoint_url(endpoint_url);
    }

    config_builder.load().await
}
