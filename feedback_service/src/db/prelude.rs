pub use super::feedback_request::Entity as FeedbackRequest;
