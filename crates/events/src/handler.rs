/// Execute an aggregate command deterministically (no IO).
///
/// 1. **Decide**: `aggregate.handle(command)` produces events without mutation.
/// 2. **Evolve**: each event is applied to the aggregate in order.
///
/// Services call this on a *staged copy* of the stored aggregate; the copy is
/// only persisted if the whole unit of work commits, so a failed decision or a
/// failed commit leaves the stored snapshot untouched.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: fleetstock_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
