use super::PagingError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = PagingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(PagingError::UnknownDirection(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
        }
    }
}

/// Ordered list of `(property, direction)` pairs. Empty means unsorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Same direction for every listed property, in the given order.
    pub fn by(direction: Direction, properties: &[&str]) -> Self {
        Self {
            orders: properties
                .iter()
                .map(|property| Order {
                    property: (*property).to_string(),
                    direction,
                })
                .collect(),
        }
    }

    /// Appends one more order; earlier orders keep precedence.
    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }
}

impl Display for Sort {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.orders.is_empty() {
            return f.write_str("UNSORTED");
        }
        let rendered = self
            .orders
            .iter()
            .map(|order| format!("{}: {}", order.property, order.direction.as_sql()))
            .collect::<Vec<_>>()
            .join(", ");
        f.write_str(&rendered)
    }
}

/// 0-based page index, positive page size and a sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    page: u64,
    size: u64,
    sort: Sort,
}

impl PageRequest {
    pub fn of(page: u64, size: u64) -> Result<Self, PagingError> {
        Self::sorted(page, size, Sort::unsorted())
    }

    pub fn sorted(page: u64, size: u64, sort: Sort) -> Result<Self, PagingError> {
        if size == 0 {
            return Err(PagingError::ZeroPageSize);
        }
        Ok(Self { page, size, sort })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    /// Row offset of the first element, `page * size`.
    pub fn offset(&self) -> Result<u64, PagingError> {
        self.page
            .checked_mul(self.size)
            .filter(|offset| i64::try_from(*offset).is_ok())
            .ok_or(PagingError::OffsetOverflow {
                page: self.page,
                size: self.size,
            })
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            size: self.size,
            sort: self.sort.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Order, PageRequest, Sort};
    use crate::paging::PagingError;

    #[test]
    fn zero_size_is_rejected() {
        assert_eq!(PageRequest::of(0, 0), Err(PagingError::ZeroPageSize));
    }

    #[test]
    fn offset_is_page_times_size_and_overflow_is_reported() {
        assert_eq!(PageRequest::of(3, 20).unwrap().offset(), Ok(60));
        let huge = PageRequest::of(u64::MAX, 2).unwrap();
        assert!(matches!(
            huge.offset(),
            Err(PagingError::OffsetOverflow { .. })
        ));
    }

    #[test]
    fn sort_keeps_declaration_order() {
        let sort = Sort::by(Direction::Desc, &["username"]).and(Order::asc("age"));
        assert_eq!(sort.orders().len(), 2);
        assert_eq!(sort.to_string(), "username: DESC, age: ASC");
        assert_eq!("DESC".parse::<Direction>(), Ok(Direction::Desc));
        assert!("sideways".parse::<Direction>().is_err());
    }
}
