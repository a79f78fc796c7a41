//! Gas log form
//!
//! The flat record a user fills in for one fuel-up, which inputs are visible
//! for the chosen odometer method, and required-field validation.

mod fields;
mod validate;

pub use fields::{FormField, GasForm, OdometerInputMethod, Upload, YesNo};
pub use validate::FieldErrors;
