pub mod network;
pub mod optim;
pub mod training;
pub mod types;
pub mod utils;

pub use network::{Activation, InputScaler, LayerSpec, ModelSpec, Network};
pub use optim::Adam;
pub use training::*;
pub use types::*;
pub use utils::*;
