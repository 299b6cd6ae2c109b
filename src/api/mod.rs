pub mod factura;
pub mod solicitud;
pub mod ticket;

pub use self::{factura::Factura, solicitud::Solicitud, ticket::Ticket};
