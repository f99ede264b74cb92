//! Business logic and repository trait definitions for todoloop.
//!
//! This crate defines the "ports" (repository traits, unit of work, chat
//! model, tool registry, event publisher) that the infrastructure layer
//! implements, plus the two processes built on them: the turn orchestrator
//! and the outbox relay. It depends only on `todoloop-types`, never on
//! `todoloop-infra` or any database/IO crate.

pub mod chat;
pub mod clock;
pub mod event;
pub mod llm;
pub mod outbox;
pub mod repository;
pub mod tool;
