pub mod links;
pub mod projects;
