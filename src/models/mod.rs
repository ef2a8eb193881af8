pub mod audit;
pub mod checklist;
pub mod directive;
