use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Verified, Rendered, Stored, Analyzed, Categorized, Completed],
    events {
        verify { transition: { from: Ready, to: Verified } }
        render { transition: { from: Verified, to: Rendered } }
        store { transition: { from: Rendered, to: Stored } }
        analyze { transition: { from: Stored, to: Analyzed } }
        categorize { transition: { from: Analyzed, to: Categorized } }
        complete { transition: { from: Categorized, to: Completed } }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
