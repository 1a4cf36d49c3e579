use crate::core::provider::Resource;

use super::StepContext;

const MESSAGE_BODY: &str = "{}";

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    let jobs = &ctx.resources.jobs;
    let topics = &ctx.resources.topics;
    let schedules = &ctx.settings.schedules;
    [
        (&jobs.load_queue, &schedules.load_queue, &topics.load_queue_trigger),
        (
            &jobs.pick_notifications,
            &schedules.pick_notifications,
            &topics.pick_notifications_trigger,
        ),
        (&jobs.archive, &schedules.archive, &topics.archive_trigger),
        (&jobs.cost_mon, &schedules.cost_mon, &topics.cost_mon_trigger),
    ]
    .into_iter()
    .map(|(name, schedule, topic)| Resource::SchedulerJob {
        name: name.clone(),
        region: ctx.settings.region.clone(),
        schedule: schedule.clone(),
        topic: topic.clone(),
        message_body: MESSAGE_BODY.to_string(),
    })
    .collect()
}
