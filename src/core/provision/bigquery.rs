use crate::core::provider::Resource;

use super::StepContext;

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    let dataset = |name: &str, description: &str| Resource::BigQueryDataset {
        name: name.to_string(),
        location: ctx.settings.region.clone(),
        description: description.to_string(),
    };
    let mut resources = vec![dataset(&ctx.resources.bigquery_dataset, "KCIDB archive")];
    if let Some(test) = &ctx.resources.test {
        resources.push(dataset(
            &test.clean.bigquery_dataset,
            "KCIDB archive (clean test copy)",
        ));
        resources.push(dataset(
            &test.empty.bigquery_dataset,
            "KCIDB archive (empty test copy)",
        ));
    }
    resources
}
