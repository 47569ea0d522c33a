//! GraphQL documents
//!
//! The enumeration query asks for the first page of every nested connection.
//! Review-thread comments are capped lower there than in the dedicated thread
//! query so that one enumeration page stays under the host's per-query node
//! limit.

/// Page size of every nested connection
pub const NESTED_PAGE_SIZE: u32 = 100;

/// Comments per review thread requested inside the enumeration query
pub const ENUMERATION_THREAD_COMMENTS: u32 = 20;

const COMMENT_FIELDS: &str = "
fragment CommentFields on IssueComment {
  id
  author { login }
  body
  createdAt
}";

const COMMIT_FIELDS: &str = "
fragment CommitFields on PullRequestCommit {
  commit {
    oid
    message
    committedDate
    author { name email user { login } }
  }
}";

const REVIEW_COMMENT_FIELDS: &str = "
fragment ReviewCommentFields on PullRequestReviewComment {
  id
  author { login }
  body
  path
  diffHunk
  createdAt
}";

/// Review-thread selection with the given number of inner comments
fn review_thread_fields(comments: u32) -> String {
    format!(
        "
fragment ReviewThreadFields on PullRequestReviewThread {{
  id
  isResolved
  path
  comments(first: {comments}) {{
    totalCount
    pageInfo {{ hasNextPage endCursor }}
    nodes {{ ...ReviewCommentFields }}
  }}
}}
{REVIEW_COMMENT_FIELDS}"
    )
}

/// Top-level connection of pull requests, newest first
pub fn pull_requests_query() -> String {
    format!(
        "query PullRequests($owner: String!, $name: String!, $first: Int!, $cursor: String) {{
  repository(owner: $owner, name: $name) {{
    pullRequests(first: $first, after: $cursor, orderBy: {{field: CREATED_AT, direction: DESC}}) {{
      totalCount
      pageInfo {{ hasNextPage endCursor }}
      nodes {{
        number
        title
        body
        createdAt
        closedAt
        mergedAt
        state
        author {{ login }}
        headRefName
        labels(first: 100) {{ nodes {{ name }} }}
        additions
        deletions
        changedFiles
        comments(first: {page}) {{
          totalCount
          pageInfo {{ hasNextPage endCursor }}
          nodes {{ ...CommentFields }}
        }}
        reviewThreads(first: {page}) {{
          totalCount
          pageInfo {{ hasNextPage endCursor }}
          nodes {{ ...ReviewThreadFields }}
        }}
        commits(first: {page}) {{
          totalCount
          pageInfo {{ hasNextPage endCursor }}
          nodes {{ ...CommitFields }}
        }}
      }}
    }}
  }}
}}
{COMMENT_FIELDS}
{threads}
{COMMIT_FIELDS}",
        page = NESTED_PAGE_SIZE,
        threads = review_thread_fields(ENUMERATION_THREAD_COMMENTS),
    )
}

/// Single-item query for one nested field, aliased to `connection`
fn nested_query(operation: &str, field: &str, fragment_name: &str, fragment: &str) -> String {
    format!(
        "query {operation}($owner: String!, $name: String!, $number: Int!, $cursor: String) {{
  repository(owner: $owner, name: $name) {{
    pullRequest(number: $number) {{
      connection: {field}(first: {page}, after: $cursor) {{
        totalCount
        pageInfo {{ hasNextPage endCursor }}
        nodes {{ ...{fragment_name} }}
      }}
    }}
  }}
}}
{fragment}",
        page = NESTED_PAGE_SIZE,
    )
}

pub fn comments_query() -> String {
    nested_query("PullRequestComments", "comments", "CommentFields", COMMENT_FIELDS)
}

pub fn review_threads_query() -> String {
    nested_query(
        "PullRequestReviewThreads",
        "reviewThreads",
        "ReviewThreadFields",
        &review_thread_fields(NESTED_PAGE_SIZE),
    )
}

pub fn commits_query() -> String {
    nested_query("PullRequestCommits", "commits", "CommitFields", COMMIT_FIELDS)
}

/// Comments of one review thread, looked up by node id
pub fn thread_comments_query() -> String {
    format!(
        "query ReviewThreadComments($id: ID!, $cursor: String) {{
  node(id: $id) {{
    ... on PullRequestReviewThread {{
      connection: comments(first: {page}, after: $cursor) {{
        totalCount
        pageInfo {{ hasNextPage endCursor }}
        nodes {{ ...ReviewCommentFields }}
      }}
    }}
  }}
}}
{REVIEW_COMMENT_FIELDS}",
        page = NESTED_PAGE_SIZE,
    )
}
