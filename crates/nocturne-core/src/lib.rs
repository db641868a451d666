pub mod error;
pub mod keywords;
pub mod frame;
pub mod grouping;
pub mod combine;
pub mod io;
pub mod archive;
pub mod master;
pub mod timecorr;
pub mod config;
pub mod reduce;
