/// The `AccountType` product-description builder and its validation pass.
pub mod account_type;
/// Plain declarative data types shared by product descriptions.
pub mod types;

pub use account_type::AccountType;
