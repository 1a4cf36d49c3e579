use super::events::Event;

/// Observer for progress events emitted while a plan runs.
///
/// Events are delivered as they happen, so a reporter sees the steps that completed
/// before a failing one even though the operation itself returns `Err`.
pub trait Reporter {
    fn report(&mut self, event: Event);
}

impl Reporter for () {
    fn report(&mut self, _event: Event) {}
}

impl Reporter for Vec<Event> {
    fn report(&mut self, event: Event) {
        self.push(event);
    }
}
