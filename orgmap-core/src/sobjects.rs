use crate::cache::{META_TTL, MetadataCache, sobjects_key};
use crate::error::Result;
use crate::filter::is_config_object_name;
use crate::model::BusinessObject;
use orgmap_scanner::{SObjectSummary, SchemaClient};
use tracing::debug;

pub const MAX_SEARCH_RESULTS: usize = 25;

/// Queryable, non-configuration objects sorted by label
pub fn business_objects(summaries: Vec<SObjectSummary>) -> Vec<BusinessObject> {
    let mut objects: Vec<BusinessObject> = summaries
        .into_iter()
        .filter(|o| o.queryable && !is_config_object_name(&o.name))
        .map(|o| BusinessObject {
            label: o.label.filter(|l| !l.is_empty()).unwrap_or_else(|| o.name.clone()),
            name: o.name,
            custom: o.custom,
        })
        .collect();
    objects.sort_by(|a, b| {
        a.label
            .to_lowercase()
            .cmp(&b.label.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    objects
}

pub async fn list_business_sobjects(
    client: &SchemaClient,
    cache: &MetadataCache,
) -> Result<Vec<BusinessObject>> {
    let key = sobjects_key(client.connection());
    if let Some(cached) = cache.get::<Vec<BusinessObject>>(&key) {
        debug!("Object catalog cache hit");
        return Ok(cached);
    }

    let objects = business_objects(client.list_sobjects().await?);
    cache.set(&key, &objects, META_TTL);
    Ok(objects)
}

/// Case-insensitive substring match on name or label
pub fn search_objects<'a>(objects: &'a [BusinessObject], term: &str) -> Vec<&'a BusinessObject> {
    let term = term.trim().to_lowercase();
    objects
        .iter()
        .filter(|o| {
            term.is_empty()
                || o.name.to_lowercase().contains(&term)
                || o.label.to_lowercase().contains(&term)
        })
        .take(MAX_SEARCH_RESULTS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(name: &str, label: Option<&str>, queryable: bool) -> SObjectSummary {
        SObjectSummary {
            name: name.to_string(),
            label: label.map(str::to_string),
            custom: name.ends_with("__c"),
            queryable,
        }
    }

    #[test]
    fn test_business_objects_filter_and_sort() {
        let objects = business_objects(vec![
            summary("Contact", Some("Contact"), true),
            summary("AccountHistory", Some("Account History"), true),
            summary("Invoice__c", None, true),
            summary("Account", Some("Account"), true),
            summary("Hidden__c", Some("Hidden"), false),
            summary("ApexClass", Some("Apex Class"), true),
        ]);

        let names: Vec<_> = objects.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(names, vec!["Account", "Contact", "Invoice__c"]);
        assert_eq!(objects[2].label, "Invoice__c");
        assert!(objects[2].custom);
    }

    #[test]
    fn test_search_limits_results() {
        let objects: Vec<BusinessObject> = (0..40)
            .map(|i| BusinessObject {
                name: format!("Thing{}__c", i),
                label: format!("Thing {}", i),
                custom: true,
            })
            .collect();

        assert_eq!(search_objects(&objects, "thing").len(), MAX_SEARCH_RESULTS);
        assert_eq!(search_objects(&objects, "THING 7").len(), 1);
        assert_eq!(search_objects(&objects, "thing7__c")[0].label, "Thing 7");
        assert!(search_objects(&objects, "zzz").is_empty());
    }
}
