pub mod intercept;
pub mod output;
pub mod providers;
pub mod resolve;
