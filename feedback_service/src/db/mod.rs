pub mod prelude;

pub mod feedback_request;
