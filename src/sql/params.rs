//! Bind [`BoundValue`]s to MySQL queries.

use crate::binder::BoundValue;
use sqlx::encode::{Encode, IsNull};
use sqlx::mysql::{MySql, MySqlArguments, MySqlTypeInfo};
use sqlx::query::Query;
use sqlx::{Database, Type};

impl<'q> Encode<'q, MySql> for BoundValue {
    fn encode_by_ref(
        &self,
        buf: &mut <MySql as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            BoundValue::Absent | BoundValue::Null => IsNull::Yes,
            BoundValue::Text(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<MySql>>::encode_by_ref(&s_ref, buf)?
            }
            BoundValue::Integer(n) => <i64 as Encode<MySql>>::encode_by_ref(n, buf)?,
        })
    }

    fn produces(&self) -> Option<MySqlTypeInfo> {
        match self {
            BoundValue::Integer(_) => Some(<i64 as Type<MySql>>::type_info()),
            _ => Some(<str as Type<MySql>>::type_info()),
        }
    }
}

impl Type<MySql> for BoundValue {
    fn type_info() -> MySqlTypeInfo {
        <str as Type<MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        <str as Type<MySql>>::compatible(ty) || <i64 as Type<MySql>>::compatible(ty)
    }
}

/// Binds every parameter of a statement, in order.
pub fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[BoundValue],
) -> Query<'q, MySql, MySqlArguments> {
    for p in params {
        query = query.bind(p.clone());
    }
    query
}
