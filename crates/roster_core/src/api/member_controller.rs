use crate::dto::MemberDto;
use crate::model::managed::Managed;
use crate::model::member::{Member, MemberId};
use crate::model::Identifiable;
use crate::paging::{Direction, Order, Page, PageRequest, PagingError, Sort};
use crate::repo::{CrudRepository, RepoError};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};
use url::form_urlencoded;

pub const DEFAULT_PAGE_SIZE: u64 = 5;
pub const MAX_PAGE_SIZE: u64 = 2000;

/// Controller-level failure, one variant per response class.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    /// Malformed or invalid request parameters.
    BadRequest(String),
    Repo(RepoError),
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(message) => write!(f, "not found: {message}"),
            Self::BadRequest(message) => write!(f, "bad request: {message}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ApiError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::NotFound(_) | Self::BadRequest(_) => None,
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::InvalidRequest(err) => Self::BadRequest(err.to_string()),
            other => Self::Repo(other),
        }
    }
}

/// Member endpoints over any member CRUD repository.
pub struct MemberController<R: CrudRepository<Member>> {
    repo: R,
}

impl<R: CrudRepository<Member>> MemberController<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// `GET /members/{id}`: the member's username.
    pub fn find_member(&self, id: i64) -> Result<String, ApiError> {
        let member = self
            .repo
            .find_by_id(MemberId(id))?
            .ok_or_else(|| ApiError::NotFound(format!("member {id}")))?;
        let username = member.borrow().username.clone();
        Ok(username)
    }

    /// `GET /members?page=0&size=3&sort=id,desc`: one page of member DTOs.
    ///
    /// # Contract
    /// - Missing `size` (or `size=0`) means [`DEFAULT_PAGE_SIZE`].
    /// - `size` above [`MAX_PAGE_SIZE`] is capped.
    /// - Unknown sort properties are `BadRequest`.
    /// - `teamName` is always `null`.
    pub fn list(&self, query: &str) -> Result<Page<MemberDto>, ApiError> {
        let request = parse_pageable(query)?;
        let page = self.repo.find_all_paged(&request)?;
        Ok(page.map(|member| to_dto(&member)))
    }

    /// Seeds `member0..member{count-1}` with `age = i`.
    pub fn init(&self, count: u32) -> Result<(), ApiError> {
        for index in 0..count {
            let age = i32::try_from(index)
                .map_err(|_| ApiError::BadRequest(format!("seed count {count} too large")))?;
            self.repo
                .save(&Managed::new(Member::with_age(format!("member{index}"), age)))?;
        }
        info!("event=members_seed module=api status=ok count={count}");
        Ok(())
    }
}

fn to_dto(member: &Managed<Member>) -> MemberDto {
    let member = member.borrow();
    MemberDto::new(
        member.id().map_or(0, i64::from),
        member.username.clone(),
        None,
    )
}

/// Parses `page`, `size` and repeated `sort=property[,asc|desc]` parameters
/// from a form-urlencoded query string.
///
/// Other keys are ignored. The page index is 0-based.
pub fn parse_pageable(query: &str) -> Result<PageRequest, ApiError> {
    let mut page = 0_u64;
    let mut size = None;
    let mut sort = Sort::unsorted();

    for (key, value) in form_urlencoded::parse(query.trim_start_matches('?').as_bytes()) {
        match &*key {
            "page" => page = parse_number("page", &value)?,
            "size" => size = Some(parse_number("size", &value)?),
            "sort" => sort = sort.and(parse_order(&value)?),
            _ => {}
        }
    }

    let size = match size {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(value) if value > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        Some(value) => value,
    };
    PageRequest::sorted(page, size, sort).map_err(|err| ApiError::BadRequest(err.to_string()))
}

fn parse_number(key: &str, value: &str) -> Result<u64, ApiError> {
    value.trim().parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "`{key}` must be a non-negative integer, got `{value}`"
        ))
    })
}

fn parse_order(value: &str) -> Result<Order, ApiError> {
    let (property, direction) = match value.split_once(',') {
        Some((property, direction)) => (property.trim(), direction.trim()),
        None => (value.trim(), "asc"),
    };
    if property.is_empty() {
        return Err(ApiError::BadRequest("empty sort property".to_string()));
    }
    let direction: Direction = direction
        .parse()
        .map_err(|err: PagingError| ApiError::BadRequest(err.to_string()))?;
    Ok(match direction {
        Direction::Asc => Order::asc(property),
        Direction::Desc => Order::desc(property),
    })
}
