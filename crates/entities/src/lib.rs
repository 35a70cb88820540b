//! Entity service clients
//!
//! The pipeline's contract with the external CRUD services that own the
//! relational store:
//! - Service traits per entity kind (create, find, list, update, remove)
//! - DTOs and paginated listings in the services' wire shapes
//! - An HTTP client implementation
//! - An in-memory store with the same semantic constraints, for tests and
//!   local development
//! - A gateway bundling the four service handles

pub mod dto;
pub mod gateway;
pub mod http;
pub mod memory;
pub mod services;

pub use dto::{
    CreateProjectDto, CreateTaskDto, CreateTeamDto, CreateUserDto, Page, UpdateProjectDto,
    UpdateTaskDto, UpdateTeamDto, UpdateUserDto,
};
pub use gateway::{EntityCounts, EntityGateway};
pub use http::{EntityClientConfig, HttpEntityClient};
pub use memory::InMemoryEntityStore;
pub use services::{ProjectService, TaskService, TeamService, UserService};
