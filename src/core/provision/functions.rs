use crate::core::provider::{FunctionSpec, FunctionTrigger, Resource};

use super::{StepContext, artifacts};

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    let names = &ctx.resources.functions;
    let topics = &ctx.resources.topics;
    let settings = &ctx.settings.functions;
    let docker_repository = artifacts::repository_path(ctx);

    let function = |name: &str, entry_point: &str, trigger: FunctionTrigger| {
        Resource::Function(Box::new(FunctionSpec {
            name: name.to_string(),
            region: ctx.settings.region.clone(),
            runtime: settings.runtime.clone(),
            entry_point: entry_point.to_string(),
            source: ctx.features.source.clone(),
            memory: settings.memory.clone(),
            timeout_sec: settings.timeout_sec,
            service_account: ctx.resources.runtime_service_account(),
            docker_repository: docker_repository.clone(),
            trigger,
            environment: ctx.environment.clone(),
        }))
    };
    let on_topic = |topic: &str| FunctionTrigger::Topic(topic.to_string());

    vec![
        function(
            &names.load_queue,
            "kcidb_load_queue",
            on_topic(&topics.load_queue_trigger),
        ),
        function(
            &names.spool_notifications,
            "kcidb_spool_notifications",
            on_topic(&topics.updated),
        ),
        function(
            &names.pick_notifications,
            "kcidb_pick_notifications",
            on_topic(&topics.pick_notifications_trigger),
        ),
        function(
            &names.cache_urls,
            "kcidb_cache_urls",
            on_topic(&topics.updated_urls),
        ),
        function(
            &names.cache_redirect,
            "kcidb_cache_redirect",
            FunctionTrigger::Http,
        ),
        function(
            &names.archive,
            "kcidb_archive",
            on_topic(&topics.archive_trigger),
        ),
        function(
            &names.cost_mon,
            "kcidb_cost_mon",
            on_topic(&topics.cost_mon_trigger),
        ),
    ]
}
