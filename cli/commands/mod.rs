pub mod completion;
pub mod extract;
pub mod preview;
pub mod rules;
