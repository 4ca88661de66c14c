mod ids;
mod listing;
mod wire;
