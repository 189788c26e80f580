pub mod player;
pub mod beta;
pub mod optim;
pub mod prior;
pub mod simulate;
pub mod estimate;
pub mod evaluate;
pub mod replicate;
