//! Pure builders for the GraphQL documents the aggregator sends. No I/O
//! happens here; cursors and years arrive as plain values and a document
//! string comes back.

/// Render a pagination cursor as a GraphQL literal: `null` on the first
/// page, a quoted token afterwards.
fn cursor_literal(cursor: Option<&str>) -> String {
    match cursor {
        Some(cursor) => format!("\"{cursor}\""),
        None => "null".to_string(),
    }
}

/// One combined overview page: up to 100 owned non-fork repositories and up
/// to 100 repositories contributed to, each with stargazers, forks, and the
/// top 10 languages by size. Both collections paginate independently.
pub fn repos_overview(owned_cursor: Option<&str>, contrib_cursor: Option<&str>) -> String {
    format!(
        r#"{{
  viewer {{
    login,
    name,
    repositories(
        first: 100,
        orderBy: {{
            field: UPDATED_AT,
            direction: DESC
        }},
        isFork: false,
        after: {owned_after}
    ) {{
      pageInfo {{
        hasNextPage
        endCursor
      }}
      nodes {{
        nameWithOwner
        stargazers {{
          totalCount
        }}
        forkCount
        languages(first: 10, orderBy: {{field: SIZE, direction: DESC}}) {{
          edges {{
            size
            node {{
              name
              color
            }}
          }}
        }}
      }}
    }}
    repositoriesContributedTo(
        first: 100,
        includeUserRepositories: false,
        orderBy: {{
            field: UPDATED_AT,
            direction: DESC
        }},
        contributionTypes: [
            COMMIT,
            PULL_REQUEST,
            REPOSITORY,
            PULL_REQUEST_REVIEW
        ]
        after: {contrib_after}
    ) {{
      pageInfo {{
        hasNextPage
        endCursor
      }}
      nodes {{
        nameWithOwner
        stargazers {{
          totalCount
        }}
        forkCount
        languages(first: 10, orderBy: {{field: SIZE, direction: DESC}}) {{
          edges {{
            size
            node {{
              name
              color
            }}
          }}
        }}
      }}
    }}
  }}
}}
"#,
        owned_after = cursor_literal(owned_cursor),
        contrib_after = cursor_literal(contrib_cursor),
    )
}

/// Every calendar year in which the user has a recorded contribution.
pub fn contrib_years() -> String {
    r#"
query {
  viewer {
    contributionsCollection {
      contributionYears
    }
  }
}
"#
    .to_string()
}

/// Aliased fragment selecting the contribution total for one calendar-year
/// window, `[year-01-01, (year+1)-01-01)`.
pub fn contribs_by_year(year: &str) -> String {
    let next_year = year.parse::<i64>().map(|y| y + 1).unwrap_or_default();
    format!(
        r#"
    year{year}: contributionsCollection(
        from: "{year}-01-01T00:00:00Z",
        to: "{next_year}-01-01T00:00:00Z"
    ) {{
      contributionCalendar {{
        totalContributions
      }}
    }}
"#
    )
}

/// One combined query covering the contribution totals for every given year.
pub fn all_contribs(years: &[String]) -> String {
    let by_years: String = years.iter().map(|year| contribs_by_year(year)).collect();
    format!(
        r#"
query {{
  viewer {{
    {by_years}
  }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overview_first_page_uses_null_cursors() {
        let document = repos_overview(None, None);
        assert_eq!(document.matches("after: null").count(), 2);
        assert!(document.contains("isFork: false"));
        assert!(document.contains("repositoriesContributedTo"));
        assert!(document.contains("languages(first: 10"));
    }

    #[test]
    fn overview_embeds_quoted_cursors() {
        let document = repos_overview(Some("OWNED=="), Some("CONTRIB=="));
        assert!(document.contains(r#"after: "OWNED==""#));
        assert!(document.contains(r#"after: "CONTRIB==""#));
        assert!(!document.contains("after: null"));
    }

    #[test]
    fn overview_cursors_are_independent() {
        let document = repos_overview(Some("OWNED=="), None);
        assert!(document.contains(r#"after: "OWNED==""#));
        assert_eq!(document.matches("after: null").count(), 1);
    }

    #[test]
    fn contribs_by_year_spans_one_calendar_year() {
        let fragment = contribs_by_year("2021");
        assert!(fragment.contains("year2021: contributionsCollection"));
        assert!(fragment.contains(r#"from: "2021-01-01T00:00:00Z""#));
        assert!(fragment.contains(r#"to: "2022-01-01T00:00:00Z""#));
    }

    #[test]
    fn all_contribs_emits_one_window_per_year() {
        let years = vec!["2019".to_string(), "2020".to_string()];
        let document = all_contribs(&years);
        assert!(document.contains("year2019"));
        assert!(document.contains("year2020"));
        assert!(document.contains("totalContributions"));
    }

    #[test]
    fn all_contribs_with_no_years_is_still_a_query() {
        let document = all_contribs(&[]);
        assert!(document.contains("viewer"));
        assert!(!document.contains("contributionsCollection"));
    }
}
