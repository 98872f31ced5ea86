// ============================
// mafia-backend-lib/src/records.rs
// ============================
//! Record persistence for users, games and players.
//!
//! The realtime channels only ever call `find_user_by_id`,
//! `update_game_stage` and `remove_player`; the rest of the trait backs
//! the REST CRUD layer. The store is behind a trait so the channels do
//! not care what holds the documents.
use async_trait::async_trait;
use dashmap::DashMap;
use mafia_common::{Game, Player, User};
use rand::seq::SliceRandom;
use uuid::Uuid;

use crate::auth::verify_password;
use crate::error::AppError;

/// Roles dealt to a six-seat game, shuffled per game. Seats beyond the
/// sixth fall back to villager.
const ROLES: [&str; 6] = ["mafia", "doctor", "police", "villager", "villager", "villager"];

/// Trait for record storage backends
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a user. Fails if the email is already registered.
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError>;

    /// Check credentials and return the matching user.
    async fn authenticate_user(&self, email: &str, password: &str) -> Result<User, AppError>;

    /// Look up a user by id.
    async fn find_user_by_id(&self, id: &str) -> Result<User, AppError>;

    async fn list_users(&self) -> Result<Vec<User>, AppError>;

    /// Create a game holding the given user ids, starting in the lobby stage.
    async fn create_game(&self, players: Vec<String>) -> Result<Game, AppError>;

    async fn list_games(&self) -> Result<Vec<Game>, AppError>;

    /// Replace a game's player roster.
    async fn update_game_players(
        &self,
        game_id: &str,
        players: Vec<String>,
    ) -> Result<Game, AppError>;

    /// Persist a new stage for a game.
    async fn update_game_stage(&self, game_id: &str, stage: &str) -> Result<Game, AppError>;

    /// Create player records for a game, dealing shuffled roles.
    async fn create_players(
        &self,
        game_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<Player>, AppError>;

    async fn find_player(&self, id: &str) -> Result<Player, AppError>;

    async fn players_in_game(&self, game_id: &str) -> Result<Vec<Player>, AppError>;

    /// Remove the player record for `(game_id, user_id)` and pull the user
    /// from the game's roster. Removing an absent player is not an error.
    async fn remove_player(&self, game_id: &str, user_id: &str) -> Result<(), AppError>;
}

struct StoredUser {
    user: User,
    password_hash: String,
}

/// In-memory document store implementation of [`RecordStore`].
#[derive(Default)]
pub struct MemoryRecords {
    users: DashMap<String, StoredUser>,
    games: DashMap<String, Game>,
    players: DashMap<String, Player>,
}

impl MemoryRecords {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecords {
    async fn create_user(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, AppError> {
        let duplicate = self
            .users
            .iter()
            .any(|entry| entry.value().user.email == email);
        if duplicate {
            return Err(AppError::Persistence(format!(
                "email already registered: {email}"
            )));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            email: email.to_string(),
        };
        self.users.insert(
            user.id.clone(),
            StoredUser {
                user: user.clone(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(user)
    }

    async fn authenticate_user(&self, email: &str, password: &str) -> Result<User, AppError> {
        let matched = self.users.iter().find_map(|entry| {
            let stored = entry.value();
            if stored.user.email == email {
                Some((stored.user.clone(), stored.password_hash.clone()))
            } else {
                None
            }
        });

        match matched {
            Some((user, hash)) if verify_password(&hash, password) => Ok(user),
            _ => Err(AppError::InvalidCredentials),
        }
    }

    async fn find_user_by_id(&self, id: &str) -> Result<User, AppError> {
        self.users
            .get(id)
            .map(|entry| entry.user.clone())
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.users.iter().map(|e| e.value().user.clone()).collect())
    }

    async fn create_game(&self, players: Vec<String>) -> Result<Game, AppError> {
        let game = Game {
            id: Uuid::new_v4().to_string(),
            players,
            stage: "lobby".to_string(),
        };
        self.games.insert(game.id.clone(), game.clone());
        Ok(game)
    }

    async fn list_games(&self) -> Result<Vec<Game>, AppError> {
        Ok(self.games.iter().map(|e| e.value().clone()).collect())
    }

    async fn update_game_players(
        &self,
        game_id: &str,
        players: Vec<String>,
    ) -> Result<Game, AppError> {
        let mut game = self
            .games
            .get_mut(game_id)
            .ok_or_else(|| AppError::NotFound(format!("game {game_id}")))?;
        game.players = players;
        Ok(game.clone())
    }

    async fn update_game_stage(&self, game_id: &str, stage: &str) -> Result<Game, AppError> {
        let mut game = self
            .games
            .get_mut(game_id)
            .ok_or_else(|| AppError::Persistence(format!("no such game: {game_id}")))?;
        game.stage = stage.to_string();
        Ok(game.clone())
    }

    async fn create_players(
        &self,
        game_id: &str,
        user_ids: &[String],
    ) -> Result<Vec<Player>, AppError> {
        let mut roles: Vec<&str> = ROLES.to_vec();
        roles.shuffle(&mut rand::thread_rng());

        let mut created = Vec::with_capacity(user_ids.len());
        for (idx, user_id) in user_ids.iter().enumerate() {
            let user = self.find_user_by_id(user_id).await?;
            let player = Player {
                id: Uuid::new_v4().to_string(),
                user: user_id.clone(),
                game: game_id.to_string(),
                name: user.name,
                role: roles.get(idx).copied().unwrap_or("villager").to_string(),
                status: true,
            };
            self.players.insert(player.id.clone(), player.clone());
            created.push(player);
        }
        Ok(created)
    }

    async fn find_player(&self, id: &str) -> Result<Player, AppError> {
        self.players
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("player {id}")))
    }

    async fn players_in_game(&self, game_id: &str) -> Result<Vec<Player>, AppError> {
        Ok(self
            .players
            .iter()
            .filter(|e| e.value().game == game_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn remove_player(&self, game_id: &str, user_id: &str) -> Result<(), AppError> {
        self.players
            .retain(|_, player| !(player.game == game_id && player.user == user_id));

        if let Some(mut game) = self.games.get_mut(game_id) {
            game.players.retain(|id| id != user_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::hash_password;

    #[tokio::test]
    async fn test_user_lifecycle() {
        let records = MemoryRecords::new();
        let hash = hash_password("Password123!").unwrap();
        let user = records
            .create_user("Alice", "alice@example.com", &hash)
            .await
            .unwrap();

        let found = records.find_user_by_id(&user.id).await.unwrap();
        assert_eq!(found.name, "Alice");

        let authed = records
            .authenticate_user("alice@example.com", "Password123!")
            .await
            .unwrap();
        assert_eq!(authed.id, user.id);

        let err = records
            .authenticate_user("alice@example.com", "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let records = MemoryRecords::new();
        let hash = hash_password("Password123!").unwrap();
        records
            .create_user("Alice", "alice@example.com", &hash)
            .await
            .unwrap();
        let err = records
            .create_user("Alias", "alice@example.com", &hash)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let records = MemoryRecords::new();
        let err = records.find_user_by_id("missing").await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_game_stage_update() {
        let records = MemoryRecords::new();
        let game = records.create_game(vec!["u1".to_string()]).await.unwrap();
        assert_eq!(game.stage, "lobby");

        let updated = records.update_game_stage(&game.id, "night").await.unwrap();
        assert_eq!(updated.stage, "night");

        let err = records.update_game_stage("missing", "day").await.unwrap_err();
        assert!(matches!(err, AppError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_create_players_assigns_each_role_once() {
        let records = MemoryRecords::new();
        let hash = hash_password("Password123!").unwrap();
        let mut user_ids = Vec::new();
        for i in 0..6 {
            let user = records
                .create_user(&format!("p{i}"), &format!("p{i}@example.com"), &hash)
                .await
                .unwrap();
            user_ids.push(user.id);
        }
        let game = records.create_game(user_ids.clone()).await.unwrap();

        let players = records.create_players(&game.id, &user_ids).await.unwrap();
        assert_eq!(players.len(), 6);
        assert!(players.iter().all(|p| p.status));

        let mut roles: Vec<&str> = players.iter().map(|p| p.role.as_str()).collect();
        roles.sort_unstable();
        assert_eq!(
            roles,
            vec!["doctor", "mafia", "police", "villager", "villager", "villager"]
        );
    }

    #[tokio::test]
    async fn test_create_players_requires_known_users() {
        let records = MemoryRecords::new();
        let game = records.create_game(vec![]).await.unwrap();
        let err = records
            .create_players(&game.id, &["ghost".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_remove_player_prunes_game_roster() {
        let records = MemoryRecords::new();
        let hash = hash_password("Password123!").unwrap();
        let user = records
            .create_user("Alice", "alice@example.com", &hash)
            .await
            .unwrap();
        let game = records.create_game(vec![user.id.clone()]).await.unwrap();
        records.create_players(&game.id, &[user.id.clone()]).await.unwrap();

        records.remove_player(&game.id, &user.id).await.unwrap();
        assert!(records.players_in_game(&game.id).await.unwrap().is_empty());

        let games = records.list_games().await.unwrap();
        assert!(games[0].players.is_empty());

        // removing again is a no-op, not an error
        records.remove_player(&game.id, &user.id).await.unwrap();
    }
}
