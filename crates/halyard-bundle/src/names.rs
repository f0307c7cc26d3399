//! Entity name helpers.
//!
//! Unit names have the form `<service>/<index>`. Placeholder resolution
//! needs to tell a unit name apart from a machine id, and the tracker
//! needs the service prefix of a unit.

use crate::charm::is_valid_charm_name;

/// Whether `name` is a well-formed unit name (`wordpress/0`).
pub fn is_valid_unit_name(name: &str) -> bool {
    match name.split_once('/') {
        Some((service, index)) => {
            is_valid_charm_name(service)
                && !index.is_empty()
                && index.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// The service a unit belongs to, if `name` is a well-formed unit name.
pub fn unit_service(name: &str) -> Option<&str> {
    if is_valid_unit_name(name) {
        name.split('/').next()
    } else {
        None
    }
}
