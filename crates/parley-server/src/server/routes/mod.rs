// Route modules for Parley Server
pub mod admin; // Administrative REST surface (rooms, calls, presence)
pub mod websocket; // Signaling over WebSocket
