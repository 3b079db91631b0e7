pub mod clock;
pub mod db;
pub mod payment_gateway;
