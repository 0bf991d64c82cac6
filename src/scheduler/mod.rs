//! Background processing: the polling cycle driver.

pub mod poller;
