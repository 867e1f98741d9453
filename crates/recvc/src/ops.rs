use crate::program::Direction;

/// Mangled identifier for a user-visible name (`self` → `$self`).
pub fn func_id_of(name: &str) -> String {
    format!("${name}")
}

/// Unpacked name of one field of a bound struct (`$self'counter`).
pub fn field_id_of(binding: &str, field: &str) -> String {
    format!("${binding}'{field}")
}

pub fn contract_router(contract: &str, direction: Direction) -> String {
    format!("${contract}$_contract_router_{}", direction.as_str())
}

pub fn receive_type(contract: &str, direction: Direction, message: &str) -> String {
    format!("${contract}$_{}_binary_{message}", direction.as_str())
}

pub fn receive_empty(contract: &str, direction: Direction) -> String {
    format!("${contract}$_{}_empty", direction.as_str())
}

pub fn receive_text(contract: &str, direction: Direction, hash: &str) -> String {
    format!("${contract}$_{}_text_{hash}", direction.as_str())
}

pub fn receive_any_text(contract: &str, direction: Direction) -> String {
    format!("${contract}$_{}_text_any", direction.as_str())
}

pub fn receive_any(contract: &str, direction: Direction) -> String {
    format!("${contract}$_{}_any", direction.as_str())
}

pub fn receive_type_bounce(contract: &str, message: &str) -> String {
    format!("${contract}$_receive_binary_bounce_{message}")
}

pub fn receive_bounce_any(contract: &str) -> String {
    format!("${contract}$_receive_bounce")
}

pub fn reader(message: &str) -> String {
    format!("${message}$_load")
}

pub fn reader_bounced(message: &str) -> String {
    format!("${message}$_load_bounced")
}
