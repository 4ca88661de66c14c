mod bridge;
mod pathlock;
