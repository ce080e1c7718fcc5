pub mod blocked_slots_api;
pub mod in_memory_api;
pub mod orchestrator;
