use std::fmt;

pub const DEVICE_ID_MAX_LEN: usize = 64;
pub const PAYMENT_METHOD_MAX_LEN: usize = 32;
pub const AMOUNT_INPUT_MAX_LEN: usize = 64;

/// Payment methods accepted by the purchase flow, as `(id, display name)`.
pub const PAYMENT_METHODS: &[(&str, &str)] = &[
    ("credit", "Credit Card"),
    ("debit", "Debit Card"),
    ("paypal", "PayPal"),
    ("bank", "Bank Transfer"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

pub fn validate_enum(field: &'static str, value: &str, allowed: &[&str]) -> ValidationResult {
    if allowed.iter().all(|candidate| value != *candidate) {
        return Err(ValidationError::new(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        ));
    }

    Ok(())
}

pub fn validate_device_id(device_id: &str) -> ValidationResult {
    let device_id = sanitize_string(device_id);
    validate_required("device_id", &device_id)?;
    validate_max_len("device_id", &device_id, DEVICE_ID_MAX_LEN)?;

    if !device_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(ValidationError::new(
            "device_id",
            "must contain only letters, digits, '-' or '_'",
        ));
    }

    Ok(())
}

pub fn validate_payment_method(method: &str) -> ValidationResult {
    let method = sanitize_string(method);
    validate_required("payment_method", &method)?;
    validate_max_len("payment_method", &method, PAYMENT_METHOD_MAX_LEN)?;

    let allowed: Vec<&str> = PAYMENT_METHODS.iter().map(|(id, _)| *id).collect();
    validate_enum("payment_method", &method, &allowed)
}

/// Display name for a payment method id, falling back to the id itself.
pub fn payment_method_name(method: &str) -> &str {
    PAYMENT_METHODS
        .iter()
        .find(|(id, _)| *id == method)
        .map(|(_, name)| *name)
        .unwrap_or(method)
}
