//! Todo repository trait definition.

use todoloop_types::error::RepositoryError;
use todoloop_types::todo::{Todo, TodoFilter};
use uuid::Uuid;

pub trait TodoRepository: Send {
    fn create(
        &mut self,
        todo: &Todo,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &mut self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Todo>, RepositoryError>> + Send;

    /// Todos matching the filter, ordered by creation.
    fn list(
        &mut self,
        filter: &TodoFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Todo>, RepositoryError>> + Send;
}
