pub mod addon;
pub mod business;
pub mod customer;
pub mod lead;
pub mod cleaner;
pub mod booking;
pub mod invoice;
pub mod coupon;
pub mod chat;
pub mod notification;
