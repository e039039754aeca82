pub mod decision;
pub mod form;
pub mod schema;
pub mod transition;
pub mod upload;
pub mod validation;
