pub mod nanoleaf;
