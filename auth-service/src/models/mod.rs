pub mod domain;
pub mod key;
pub mod policy;

pub use domain::{Domain, DomainReq, DomainStatus, DomainsPage, Page};
pub use key::{Key, KeyType, Token};
pub use policy::{PolicyPage, PolicyReq, PolicyRes};
