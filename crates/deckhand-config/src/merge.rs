//! Settings document merging
//!
//! The installer ships a template settings document; operators maintain a
//! smaller custom document. The effective installation settings are the
//! template with the custom document layered on top.

use serde_json::Value;

/// Merge a custom settings document over a template document.
///
/// Objects merge key by key with custom values winning; the `applications`
/// array merges element-wise by `name`; every other array and scalar is
/// replaced wholesale by the custom side.
pub fn merge_documents(custom: Value, template: Value) -> Value {
    match (custom, template) {
        (Value::Object(custom_map), Value::Object(template_map)) => {
            let mut merged = template_map;
            for (key, custom_value) in custom_map {
                let merged_value = match merged.remove(&key) {
                    Some(template_value) if key == "applications" => {
                        merge_applications(custom_value, template_value)
                    }
                    Some(template_value) => merge_documents(custom_value, template_value),
                    None => custom_value,
                };
                merged.insert(key, merged_value);
            }
            Value::Object(merged)
        }
        // Custom side wins for scalars, arrays and type mismatches.
        (custom, _) => custom,
    }
}

/// Merge two `applications` arrays by element `name`.
///
/// Custom entries override template entries with the same name field by
/// field; custom-only entries are appended after the template order.
fn merge_applications(custom: Value, template: Value) -> Value {
    let (Value::Array(custom_apps), Value::Array(template_apps)) = (custom, template) else {
        return Value::Null;
    };

    let mut custom_by_name: Vec<(Option<String>, Value)> = custom_apps
        .into_iter()
        .map(|app| (app_name(&app), app))
        .collect();

    let mut merged = Vec::new();
    for template_app in template_apps {
        let name = app_name(&template_app);
        if let Some(pos) = custom_by_name
            .iter()
            .position(|(n, _)| n.is_some() && *n == name)
        {
            let (_, custom_app) = custom_by_name.remove(pos);
            merged.push(merge_documents(custom_app, template_app));
        } else {
            merged.push(template_app);
        }
    }

    // Applications only present in the custom document come last.
    merged.extend(custom_by_name.into_iter().map(|(_, app)| app));

    Value::Array(merged)
}

fn app_name(app: &Value) -> Option<String> {
    app.get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_custom_scalar_wins() {
        let merged = merge_documents(
            json!({ "name": "prod", "poll_interval_secs": 10 }),
            json!({ "name": "template", "poll_interval_secs": 3 }),
        );
        assert_eq!(merged["name"], "prod");
        assert_eq!(merged["poll_interval_secs"], 10);
    }

    #[test]
    fn test_template_fields_survive() {
        let merged = merge_documents(
            json!({ "name": "prod" }),
            json!({ "name": "template", "defaults": { "DB_HOST": "localhost" } }),
        );
        assert_eq!(merged["defaults"]["DB_HOST"], "localhost");
    }

    #[test]
    fn test_nested_objects_merge() {
        let merged = merge_documents(
            json!({ "blob_store": { "container": "hotfixes" } }),
            json!({ "blob_store": {
                "account_url": "https://acme.blob.core.windows.net",
                "container": "releases"
            }}),
        );
        assert_eq!(merged["blob_store"]["container"], "hotfixes");
        assert_eq!(
            merged["blob_store"]["account_url"],
            "https://acme.blob.core.windows.net"
        );
    }

    #[test]
    fn test_applications_merge_by_name() {
        let merged = merge_documents(
            json!({ "applications": [
                { "name": "site", "install_path": "/srv/site-prod" },
                { "name": "extra" }
            ]}),
            json!({ "applications": [
                { "name": "site", "install_path": "/srv/site", "main_file": "site.dll" },
                { "name": "worker", "main_file": "worker.dll" }
            ]}),
        );

        let apps = merged["applications"].as_array().unwrap();
        assert_eq!(apps.len(), 3);
        assert_eq!(apps[0]["name"], "site");
        assert_eq!(apps[0]["install_path"], "/srv/site-prod");
        assert_eq!(apps[0]["main_file"], "site.dll");
        assert_eq!(apps[1]["name"], "worker");
        assert_eq!(apps[2]["name"], "extra");
    }

    #[test]
    fn test_custom_array_replaces_template_array() {
        let merged = merge_documents(
            json!({ "applications": [{ "name": "a", "dependent_services": ["W3SVC"] }] }),
            json!({ "applications": [{ "name": "a", "dependent_services": ["W3SVC", "MSMQ"] }] }),
        );
        let deps = merged["applications"][0]["dependent_services"]
            .as_array()
            .unwrap();
        assert_eq!(deps.len(), 1);
    }
}
