//! hive-core
//!
//! File-backed coordination core for a fleet of independent worker agents.
//! Many processes share nothing but a directory of JSON documents; every
//! guarantee (at-most-one claimant, crash recovery, dependency ordering,
//! capability routing) is built on per-document file locks.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, status, priority, capability, events, errors）
//! - **ports**: 抽象化レイヤー（Clock, EventSink）
//! - **store**: 単一ドキュメントの durable read/modify/write（lock + atomic replace）
//! - **board**: Ready / Working / Completed の三面ボードと遷移操作
//! - **registry**: capability / heartbeat の永続レジストリ
//! - **app**: claim スケジューラ、reclaimer、定期メンテナンスループ

pub mod app;
pub mod board;
pub mod config;
pub mod domain;
pub mod ports;
pub mod registry;
pub mod store;
