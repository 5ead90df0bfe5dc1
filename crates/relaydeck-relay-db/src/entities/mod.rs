//! Database entities

pub mod access_key;
pub mod relay;
pub mod relay_key_link;
pub mod tenant;

pub use access_key::Entity as AccessKey;
pub use relay::Entity as Relay;
pub use relay_key_link::Entity as RelayKeyLink;
pub use tenant::Entity as Tenant;

pub mod prelude {
    pub use super::access_key::Entity as AccessKey;
    pub use super::relay::Entity as Relay;
    pub use super::relay_key_link::Entity as RelayKeyLink;
    pub use super::tenant::Entity as Tenant;
}
