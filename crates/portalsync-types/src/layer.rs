//! Project layer references and extraction eligibility.

use serde::{Deserialize, Serialize};

use crate::descriptor::ConnectionDescriptor;

/// Stable identity of a layer within a project (its URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(String);

impl LayerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for LayerId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// One data layer inside a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub is_feature: bool,
    #[serde(default)]
    pub is_basemap: bool,
    #[serde(default)]
    pub is_web: bool,
    /// Row filter ("definition query") applied when drawing the layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<ConnectionDescriptor>,
}

/// Why a layer is left out of extraction. Skips are logged, never counted
/// as failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    GroupLayer,
    NotFeatureLayer,
    BasemapOrWebLayer,
    NoConnectionInfo,
    NoAccountInfo,
    NoServerInfo,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::GroupLayer => "is a group layer",
            Self::NotFeatureLayer => "is not a feature layer",
            Self::BasemapOrWebLayer => "is a basemap/web layer",
            Self::NoConnectionInfo => "has no valid connection info",
            Self::NoAccountInfo => "has no valid user connection info",
            Self::NoServerInfo => "has no server or instance connection info",
        };
        f.write_str(s)
    }
}

impl Layer {
    /// Non-empty row filter, if any.
    #[must_use]
    pub fn active_row_filter(&self) -> Option<&str> {
        self.row_filter.as_deref().filter(|q| !q.trim().is_empty())
    }

    /// Check whether the layer can be replicated locally.
    ///
    /// # Errors
    ///
    /// Returns the first [`SkipReason`] that applies, checked in order: group,
    /// feature, basemap/web, connection, account, server.
    pub fn eligibility(&self) -> Result<(), SkipReason> {
        if self.is_group {
            return Err(SkipReason::GroupLayer);
        }
        if !self.is_feature {
            return Err(SkipReason::NotFeatureLayer);
        }
        if self.is_basemap || self.is_web {
            return Err(SkipReason::BasemapOrWebLayer);
        }
        let connection = self.connection.as_ref().ok_or(SkipReason::NoConnectionInfo)?;
        let remote = connection.as_remote().ok_or(SkipReason::NoAccountInfo)?;
        if remote.account.is_none() {
            return Err(SkipReason::NoAccountInfo);
        }
        if !remote.has_server_identity() {
            return Err(SkipReason::NoServerInfo);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_layer(source: &str) -> Layer {
        Layer {
            id: LayerId::new("CIMPATH=map/roads.xml"),
            name: "Roads".into(),
            is_group: false,
            is_feature: true,
            is_basemap: false,
            is_web: false,
            row_filter: None,
            connection: Some(ConnectionDescriptor::parse(source).unwrap()),
        }
    }

    #[test]
    fn remote_feature_layer_is_eligible() {
        let layer = feature_layer("USER=gisuser,SERVER=gisprod.world,DATASET=GIS.ROADS");
        assert_eq!(layer.eligibility(), Ok(()));
    }

    #[test]
    fn group_check_wins_over_everything() {
        let mut layer = feature_layer("USER=gisuser,SERVER=gisprod.world,DATASET=GIS.ROADS");
        layer.is_group = true;
        layer.is_basemap = true;
        assert_eq!(layer.eligibility(), Err(SkipReason::GroupLayer));
    }

    #[test]
    fn basemap_and_web_layers_are_skipped() {
        let mut layer = feature_layer("USER=gisuser,SERVER=gisprod.world,DATASET=GIS.ROADS");
        layer.is_web = true;
        assert_eq!(layer.eligibility(), Err(SkipReason::BasemapOrWebLayer));
    }

    #[test]
    fn raster_layer_is_not_feature() {
        let mut layer = feature_layer("USER=gisuser,SERVER=gisprod.world,DATASET=GIS.ROADS");
        layer.is_feature = false;
        assert_eq!(layer.eligibility(), Err(SkipReason::NotFeatureLayer));
    }

    #[test]
    fn missing_connection_pieces_are_skipped() {
        let mut layer = feature_layer("SERVER=gisprod.world,DATASET=GIS.ROADS");
        assert_eq!(layer.eligibility(), Err(SkipReason::NoAccountInfo));

        layer = feature_layer("USER=gisuser,DATASET=GIS.ROADS");
        assert_eq!(layer.eligibility(), Err(SkipReason::NoServerInfo));

        layer = feature_layer("DATABASE=/tmp/a.db,DATASET=ROADS");
        assert_eq!(layer.eligibility(), Err(SkipReason::NoAccountInfo));

        layer.connection = None;
        assert_eq!(layer.eligibility(), Err(SkipReason::NoConnectionInfo));
    }

    #[test]
    fn blank_row_filter_is_inactive() {
        let mut layer = feature_layer("USER=gisuser,SERVER=s,DATASET=GIS.ROADS");
        layer.row_filter = Some("   ".into());
        assert!(layer.active_row_filter().is_none());
        layer.row_filter = Some("STATUS = 'ACTIVE'".into());
        assert_eq!(layer.active_row_filter(), Some("STATUS = 'ACTIVE'"));
    }
}
