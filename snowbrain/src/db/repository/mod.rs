mod personas;
mod queries;
mod responses;

pub use personas::PersonaRepository;
pub use queries::QueryRepository;
pub use responses::ResponseRepository;
