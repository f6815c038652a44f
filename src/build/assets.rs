//! Client asset manifest: one entry per route, addressed by version.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::route::RouteManifest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRoute {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub index: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub case_sensitive: bool,
    pub has_action: bool,
    pub has_loader: bool,
    pub has_error_boundary: bool,
    pub module: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub css: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryAssets {
    pub module: String,
    #[serde(default)]
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsManifest {
    pub version: String,
    pub url: String,
    pub entry: EntryAssets,
    pub routes: BTreeMap<String, EntryRoute>,
}

impl AssetsManifest {
    /// Derive a manifest with one module per route under `/assets/`.
    pub fn from_routes(version: &str, url: &str, routes: &RouteManifest) -> Self {
        let routes = routes
            .iter()
            .map(|route| {
                let entry = EntryRoute {
                    id: route.id.clone(),
                    parent_id: route.parent_id.clone(),
                    path: route.path.clone(),
                    index: route.index,
                    case_sensitive: route.case_sensitive,
                    has_action: route.module.action.is_some(),
                    has_loader: route.module.loader.is_some(),
                    has_error_boundary: route.module.has_error_boundary,
                    module: format!("/assets/{}-{}.js", route.id.replace('/', "-"), version),
                    imports: Vec::new(),
                    css: Vec::new(),
                };
                (route.id.clone(), entry)
            })
            .collect();

        Self {
            version: version.to_string(),
            url: url.to_string(),
            entry: EntryAssets {
                module: format!("/assets/entry.client-{version}.js"),
                imports: Vec::new(),
            },
            routes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::route::{RouteModule, ServerRoute};

    #[test]
    fn test_entries_mirror_routes() {
        let routes = RouteManifest::new()
            .with(ServerRoute::new("root").path(""))
            .with(
                ServerRoute::new("routes/api")
                    .parent("root")
                    .path("api")
                    .module(RouteModule::new().loader(|_| async { Ok(serde_json::json!(1).into()) })),
            );
        let manifest = AssetsManifest::from_routes("abc", "/assets/manifest-abc.js", &routes);

        assert_eq!(manifest.routes.len(), 2);
        let api = &manifest.routes["routes/api"];
        assert!(api.has_loader);
        assert!(!api.has_action);
        assert_eq!(api.parent_id.as_deref(), Some("root"));
        assert_eq!(api.module, "/assets/routes-api-abc.js");

        let json = serde_json::to_value(api).unwrap();
        assert_eq!(json["parentId"], "root");
        assert!(json.get("index").is_none());
    }
}
