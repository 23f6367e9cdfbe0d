pub mod preference;
pub mod recommendation;
