//! Team repository. Teams need nothing beyond generic CRUD.

use crate::model::team::Team;
use crate::repo::crud::SqliteRepository;

pub type TeamRepository<'u, 'conn> = SqliteRepository<'u, 'conn, Team>;
