pub mod extractor;
pub mod page_model;
pub mod selectors;
