pub mod alignment;
pub mod autocorr;
pub mod clustering;
pub mod grouping;
pub mod lengths;
pub mod multimodality;
pub mod report;
pub mod speed;
pub mod stats;
pub mod variance;
pub mod velocity;
pub mod view;
