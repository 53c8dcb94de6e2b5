pub mod collab_routes;
pub mod collab_websocket;

pub use collab_routes::routes;
