//! SQLite todo repository.

use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use todoloop_core::repository::TodoRepository;
use todoloop_types::error::RepositoryError;
use todoloop_types::todo::{Todo, TodoFilter};
use uuid::Uuid;

use super::{db_error, format_datetime, parse_datetime, parse_uuid};

pub struct SqliteTodos<'t> {
    conn: &'t mut SqliteConnection,
}

impl<'t> SqliteTodos<'t> {
    pub(crate) fn new(conn: &'t mut SqliteConnection) -> Self {
        Self { conn }
    }
}

struct TodoRow {
    id: String,
    title: String,
    description: Option<String>,
    due_at: Option<String>,
    completed: bool,
    created_at: String,
    updated_at: String,
}

impl TodoRow {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            due_at: row.try_get("due_at")?,
            completed: row.try_get("completed")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_todo(self) -> Result<Todo, RepositoryError> {
        Ok(Todo {
            id: parse_uuid(&self.id, "todo id")?,
            title: self.title,
            description: self.description,
            due_at: self.due_at.as_deref().map(parse_datetime).transpose()?,
            completed: self.completed,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

fn into_todo(row: &SqliteRow) -> Result<Todo, RepositoryError> {
    TodoRow::from_row(row)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .into_todo()
}

impl TodoRepository for SqliteTodos<'_> {
    async fn create(&mut self, todo: &Todo) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO todos (id, title, description, due_at, completed, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(todo.id.to_string())
        .bind(&todo.title)
        .bind(&todo.description)
        .bind(todo.due_at.as_ref().map(format_datetime))
        .bind(todo.completed)
        .bind(format_datetime(&todo.created_at))
        .bind(format_datetime(&todo.updated_at))
        .execute(&mut *self.conn)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn get(&mut self, id: &Uuid) -> Result<Option<Todo>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, title, description, due_at, completed, created_at, updated_at FROM todos WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.conn)
        .await
        .map_err(db_error)?;

        row.as_ref().map(into_todo).transpose()
    }

    async fn list(&mut self, filter: &TodoFilter) -> Result<Vec<Todo>, RepositoryError> {
        // A negative LIMIT means no limit in SQLite.
        let rows = sqlx::query(
            r#"SELECT id, title, description, due_at, completed, created_at, updated_at
               FROM todos
               WHERE (?1 IS NULL OR completed = ?1)
               ORDER BY created_at ASC, rowid ASC
               LIMIT ?2"#,
        )
        .bind(filter.completed)
        .bind(filter.limit.map_or(-1, i64::from))
        .fetch_all(&mut *self.conn)
        .await
        .map_err(db_error)?;

        rows.iter().map(into_todo).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::testing::temp_pool;
    use crate::sqlite::SqliteUnitOfWork;
    use chrono::{Duration, SubsecRound, Utc};
    use todoloop_core::repository::{Transaction, UnitOfWork};

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let (_dir, pool) = temp_pool().await;
        let uow = SqliteUnitOfWork::new(pool);
        let now = Utc::now().trunc_subsecs(6);
        let mut todo = Todo::new("file taxes", now);
        todo.description = Some("before april".to_string());
        todo.due_at = Some(now + Duration::days(30));

        let mut tx = uow.begin().await.unwrap();
        tx.todos().create(&todo).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = uow.begin_read().await.unwrap();
        assert_eq!(tx.todos().get(&todo.id).await.unwrap(), Some(todo));
        assert!(tx.todos().get(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_completion_and_limit() {
        let (_dir, pool) = temp_pool().await;
        let uow = SqliteUnitOfWork::new(pool);
        let start = Utc::now();

        let mut tx = uow.begin().await.unwrap();
        for i in 0..4 {
            let mut todo = Todo::new(format!("todo {i}"), start + Duration::seconds(i));
            todo.completed = i % 2 == 1;
            tx.todos().create(&todo).await.unwrap();
        }
        tx.commit().await.unwrap();

        let mut tx = uow.begin_read().await.unwrap();
        assert_eq!(tx.todos().list(&TodoFilter::default()).await.unwrap().len(), 4);

        let open = tx
            .todos()
            .list(&TodoFilter {
                completed: Some(false),
                limit: None,
            })
            .await
            .unwrap();
        let titles: Vec<&str> = open.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["todo 0", "todo 2"]);

        let first = tx
            .todos()
            .list(&TodoFilter {
                completed: None,
                limit: Some(1),
            })
            .await
            .unwrap();
        assert_eq!(first[0].title, "todo 0");
        assert_eq!(first.len(), 1);
    }
}
