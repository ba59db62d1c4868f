mod view;

pub use view::{TensorView, TensorViewMut};
