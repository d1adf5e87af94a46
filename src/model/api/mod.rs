pub mod election;
pub mod otp;
pub mod voting;
