mod property_pushback;
mod property_row_constructor;
pub(crate) mod utils;
