use crate::{Result, log_debug, model::NetworkProfileCatalog, platform::SourcePlatform};

/// Snapshot every network profile on the source platform in one listing call.
pub async fn list_network_profiles(source: &dyn SourcePlatform) -> Result<NetworkProfileCatalog> {
    let profiles = source.list_network_profiles().await?;
    log_debug!("Loaded {} network profiles", profiles.len());

    Ok(profiles
        .into_iter()
        .map(|profile| (profile.id, profile.name))
        .collect())
}
