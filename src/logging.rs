// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros for consistent field names and message patterns across the application
///
/// These macros ensure:
/// - Consistent field naming conventions
/// - Appropriate logging levels for different scenarios
/// - Structured logging with context

// ============================================================================
// API Operation Logging Macros
// ============================================================================

/// Log the start of an API operation with consistent fields
#[macro_export]
macro_rules! log_api_start {
    ($operation:expr, card_id = $card_id:expr) => {
        tracing::debug!(
            operation = $operation,
            card_id = %$card_id,
            "API operation started"
        );
    };
    ($operation:expr, session_id = $session_id:expr) => {
        tracing::debug!(
            operation = $operation,
            session_id = %$session_id,
            "API operation started"
        );
    };
    ($operation:expr, owner_id = $owner_id:expr) => {
        tracing::debug!(
            operation = $operation,
            owner_id = %$owner_id,
            "API operation started"
        );
    };
    ($operation:expr) => {
        tracing::debug!(
            operation = $operation,
            "API operation started"
        );
    };
}

/// Log successful completion of an API operation
#[macro_export]
macro_rules! log_api_success {
    ($operation:expr, card_id = $card_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            card_id = %$card_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, session_id = $session_id:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            session_id = %$session_id,
            "API operation completed: {}", $msg
        );
    };
    ($operation:expr, count = $count:expr, $msg:expr) => {
        tracing::info!(
            operation = $operation,
            count = $count,
            "API operation completed: {}", $msg
        );
    };
}

/// Log API warnings with context
#[macro_export]
macro_rules! log_api_warn {
    ($operation:expr, card_id = $card_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            card_id = %$card_id,
            "API operation warning: {}", $msg
        );
    };
    ($operation:expr, session_id = $session_id:expr, $msg:expr) => {
        tracing::warn!(
            operation = $operation,
            session_id = %$session_id,
            "API operation warning: {}", $msg
        );
    };
}

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

/// Log service operation start with context
#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, card_id = $card_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            card_id = %$card_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation started"
        );
    };
}

/// Log service operation success
#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, card_id = $card_id:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            card_id = %$card_id,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

// ============================================================================
// Review Session Logging Macros
// ============================================================================

/// Log review session lifecycle events
#[macro_export]
macro_rules! log_session_event {
    (loaded, session_id = $session_id:expr, owner_id = $owner_id:expr, card_count = $count:expr) => {
        tracing::info!(
            event_type = "review_session",
            session_id = %$session_id,
            owner_id = %$owner_id,
            card_count = $count,
            "Review session loaded"
        );
    };
    (rated, session_id = $session_id:expr, card_id = $card_id:expr, quality = $quality:expr, interval = $interval:expr) => {
        tracing::debug!(
            event_type = "review_session",
            session_id = %$session_id,
            card_id = %$card_id,
            quality = $quality,
            interval_days = $interval,
            "Card rated"
        );
    };
    (complete, session_id = $session_id:expr, reason = $reason:expr) => {
        tracing::info!(
            event_type = "review_session",
            session_id = %$session_id,
            reason = ?$reason,
            "Review session complete"
        );
    };
    (rejected, session_id = $session_id:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "review_session",
            session_id = %$session_id,
            error = %$error,
            "Review session operation rejected"
        );
    };
    (failed, session_id = $session_id:expr, error = $error:expr) => {
        tracing::error!(
            event_type = "review_session",
            session_id = %$session_id,
            error = %$error,
            "Review session operation failed"
        );
    };
}

// ============================================================================
// Store Operation Logging Macros
// ============================================================================

/// Log store operation performance and results
#[macro_export]
macro_rules! log_store_operation {
    (debug, $operation:expr, card_id = $card_id:expr) => {
        tracing::debug!(
            event_type = "store",
            operation = $operation,
            card_id = %$card_id,
            "Store operation"
        );
    };
    (debug, $operation:expr, owner_id = $owner_id:expr, count = $count:expr) => {
        tracing::debug!(
            event_type = "store",
            operation = $operation,
            owner_id = %$owner_id,
            count = $count,
            "Store operation"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            event_type = "store",
            operation = $operation,
            "Store operation: {}", $msg
        );
    };
    (skip, $operation:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "store",
            operation = $operation,
            error = %$error,
            "Skipping invalid record"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}
