// =====================================================================================
// File: core-assessment/src/asset.rs
// Description: Asset read model consumed from the inventory collaborator
// =====================================================================================

use crate::AssessmentResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Importance tier carried by the inventory. The numeric weights feed the
/// risk formula: High 1.5, Medium 1.0, Low 0.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightTier {
    Low,
    Medium,
    High,
}

impl WeightTier {
    pub fn weight(&self) -> f64 {
        match self {
            WeightTier::High => 1.5,
            WeightTier::Medium => 1.0,
            WeightTier::Low => 0.5,
        }
    }
}

/// A product installed on an asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetProduct {
    pub product_name: String,
    pub product_version: Option<String>,
}

impl AssetProduct {
    pub fn new(product_name: &str, product_version: Option<&str>) -> Self {
        Self {
            product_name: product_name.to_string(),
            product_version: product_version.map(str::to_string),
        }
    }
}

/// Inventory item, read-only from this crate's point of view. Ownership of
/// asset records sits with the asset-management collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub hostname: String,
    pub ip_addresses: Vec<String>,
    pub operating_system: String,
    pub owner: String,
    pub data_sensitivity: WeightTier,
    pub business_criticality: WeightTier,
    pub products: Vec<AssetProduct>,
}

impl Asset {
    /// sensitivity x criticality, the per-asset importance term.
    pub fn importance_weight(&self) -> f64 {
        self.data_sensitivity.weight() * self.business_criticality.weight()
    }
}

/// Read access to the asset inventory.
#[async_trait]
pub trait AssetDirectory: Send + Sync {
    async fn get(&self, id: Uuid) -> AssessmentResult<Option<Asset>>;
    async fn list_all(&self) -> AssessmentResult<Vec<Asset>>;
}

/// In-memory directory used by default wiring and tests. `upsert`/`remove`
/// model inventory pushes from the collaborator.
#[derive(Default)]
pub struct InMemoryAssetDirectory {
    assets: RwLock<HashMap<Uuid, Asset>>,
}

impl InMemoryAssetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, asset: Asset) {
        self.assets.write().await.insert(asset.id, asset);
    }

    pub async fn remove(&self, id: Uuid) {
        self.assets.write().await.remove(&id);
    }
}

#[async_trait]
impl AssetDirectory for InMemoryAssetDirectory {
    async fn get(&self, id: Uuid) -> AssessmentResult<Option<Asset>> {
        Ok(self.assets.read().await.get(&id).cloned())
    }

    async fn list_all(&self) -> AssessmentResult<Vec<Asset>> {
        let mut assets: Vec<_> = self.assets.read().await.values().cloned().collect();
        assets.sort_by(|a, b| a.hostname.cmp(&b.hostname));
        Ok(assets)
    }
}

#[cfg(test)]
pub(crate) fn sample_asset(hostname: &str, products: Vec<AssetProduct>) -> Asset {
    Asset {
        id: Uuid::new_v4(),
        hostname: hostname.to_string(),
        ip_addresses: vec!["10.0.0.5".to_string()],
        operating_system: "Windows Server 2019".to_string(),
        owner: "it-ops".to_string(),
        data_sensitivity: WeightTier::Medium,
        business_criticality: WeightTier::Medium,
        products,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_tiers() {
        assert_eq!(WeightTier::High.weight(), 1.5);
        assert_eq!(WeightTier::Medium.weight(), 1.0);
        assert_eq!(WeightTier::Low.weight(), 0.5);
    }

    #[test]
    fn test_importance_weight() {
        let mut asset = sample_asset("db-01", vec![]);
        asset.data_sensitivity = WeightTier::High;
        asset.business_criticality = WeightTier::High;
        assert_eq!(asset.importance_weight(), 2.25);

        asset.business_criticality = WeightTier::Low;
        assert_eq!(asset.importance_weight(), 0.75);
    }

    #[tokio::test]
    async fn test_directory_round_trip() {
        let directory = InMemoryAssetDirectory::new();
        let asset = sample_asset("web-01", vec![AssetProduct::new("Nginx", Some("1.25"))]);
        directory.upsert(asset.clone()).await;

        let loaded = directory.get(asset.id).await.unwrap().unwrap();
        assert_eq!(loaded.hostname, "web-01");
        assert_eq!(directory.list_all().await.unwrap().len(), 1);

        directory.remove(asset.id).await;
        assert!(directory.get(asset.id).await.unwrap().is_none());
    }
}
